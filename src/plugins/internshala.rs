use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::{SourcePlugin, normalize_text};
use crate::models::{CompanyDetails, CompanyRef, Detail, Listing};

pub const DEFAULT_LISTING_URL: &str = "https://internshala.com/internships/work-from-home-backend-development,front-end-development,full-stack-development,javascript-development,node-js-development,software-development,web-development-internships/";

const NAME: &str = "internshala";

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Static-page source: one GET per call, parsed with CSS selectors.
pub struct InternshalaPlugin {
    listing_url: String,
    client: Client,
}

impl InternshalaPlugin {
    pub fn new(listing_url: impl Into<String>) -> Result<Self> {
        let listing_url = listing_url.into();
        Url::parse(&listing_url).with_context(|| format!("Invalid Internshala URL: {}", listing_url))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { listing_url, client })
    }

    fn get(&self, url: &str) -> Result<String> {
        let ua = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, ua)
            .send()
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", url, status));
        }
        response.text().context("Failed to read response body")
    }
}

impl SourcePlugin for InternshalaPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "internshala.com" || h.ends_with(".internshala.com")))
            .unwrap_or(false)
    }

    fn fetch_listings(&self, url: Option<&str>) -> Result<Vec<Listing>> {
        let url = url.unwrap_or(&self.listing_url);
        info!(plugin = NAME, "Fetching listing page from: {}", url);
        let base = Url::parse(url).with_context(|| format!("Invalid listing URL: {}", url))?;
        let html = self.get(url)?;
        let listings = parse_listings(&html, &base)?;
        info!(plugin = NAME, "Found {} listings", listings.len());
        Ok(listings)
    }

    fn fetch_details(&self, listing: &Listing) -> Option<Detail> {
        debug!(plugin = NAME, id = %listing.id, "Fetching details from {}", listing.link);
        let html = match self.get(&listing.link) {
            Ok(html) => html,
            Err(e) => {
                warn!(plugin = NAME, id = %listing.id, "Failed to fetch details: {:#}", e);
                return None;
            }
        };
        match parse_detail(&html, &listing.link) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(plugin = NAME, id = %listing.id, "Failed to parse details: {:#}", e);
                None
            }
        }
    }

    fn fetch_company_details(&self, company: CompanyRef) -> Option<CompanyDetails> {
        let url = match company {
            CompanyRef::Inline(details) => return Some(details),
            CompanyRef::External(url) => url,
        };
        let parsed = self.get(&url).and_then(|html| parse_company(&html));
        match parsed {
            Ok(details) => details,
            Err(e) => {
                warn!(plugin = NAME, "Failed to fetch company details from {}: {:#}", url, e);
                None
            }
        }
    }
}

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {}", css, e))
}

fn text_of(element: ElementRef<'_>) -> String {
    normalize_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope.select(selector).next().map(text_of).unwrap_or_default()
}

/// Parses the search-results page. Cards without an id, title or link are skipped.
pub fn parse_listings(html: &str, base: &Url) -> Result<Vec<Listing>> {
    let document = Html::parse_document(html);
    let card = sel(".individual_internship")?;
    let title = sel(".job-internship-name a")?;
    let company = sel(".company-name")?;
    let location = sel(".locations a")?;
    let stipend = sel(".stipend")?;
    let row_item = sel(".row-1-item")?;

    let mut listings = Vec::new();
    for element in document.select(&card) {
        let Some(id) = element.value().attr("internshipid").map(str::trim).filter(|id| !id.is_empty()) else {
            continue;
        };
        let Some(title_el) = element.select(&title).next() else {
            continue;
        };
        let title_text = text_of(title_el);
        let link = title_el.value().attr("href").and_then(|href| base.join(href).ok());
        let Some(link) = link.filter(|_| !title_text.is_empty()) else {
            debug!(plugin = NAME, id, "skipping card without title or link");
            continue;
        };

        let locations: Vec<String> = element.select(&location).map(text_of).collect();
        let duration = element
            .select(&row_item)
            .map(text_of)
            .find(|text| text.contains("Month") || text.contains("Week"))
            .unwrap_or_default();

        listings.push(Listing {
            id: id.to_string(),
            title: title_text,
            company: first_text(element, &company),
            location: locations.join(", "),
            link: link.to_string(),
            stipend: first_text(element, &stipend),
            duration,
            source: NAME.to_string(),
        });
    }
    Ok(listings)
}

/// Parses a posting page. The posting page also hosts the company section, so
/// the company reference points back at it.
pub fn parse_detail(html: &str, page_url: &str) -> Result<Option<Detail>> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let meta_block = sel(".internship_other_details_container")?;
    let skills = sel(".round_tabs_container .round_tabs")?;
    let posted = sel(".status-container .status-inactive, .status-container .status-success")?;
    let description = sel(".internship_details .text-container")?;
    let fallback_description = sel(".text-container")?;

    let mut meta = vec![first_text(root, &meta_block)];
    let skill_list: Vec<String> = root.select(&skills).map(text_of).filter(|s| !s.is_empty()).collect();
    if !skill_list.is_empty() {
        meta.push(format!("Skills: {}", skill_list.join(", ")));
    }
    let posted_text = first_text(root, &posted);
    if !posted_text.is_empty() {
        meta.push(format!("Posted: {}", posted_text));
    }
    meta.retain(|line| !line.is_empty());

    let mut paragraphs: Vec<String> = root.select(&description).map(text_of).filter(|p| !p.is_empty()).collect();
    if paragraphs.is_empty() {
        paragraphs = root
            .select(&fallback_description)
            .map(text_of)
            .filter(|p| !p.is_empty())
            .take(1)
            .collect();
    }
    if paragraphs.is_empty() {
        return Ok(None);
    }

    Ok(Some(Detail {
        meta: meta.join("\n"),
        description: paragraphs.join("\n"),
        company: Some(CompanyRef::External(page_url.to_string())),
    }))
}

/// Parses the "About the company" section of a posting page.
pub fn parse_company(html: &str) -> Result<Option<CompanyDetails>> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let name = sel(".company_and_premium .company-name, .company_name a, .company-name")?;
    let about = sel(".about_company_text_container")?;
    let website = sel(".website_link a")?;
    let location = sel("#location_names a, .location_link")?;
    let activity = sel(".activity_section .activity")?;

    let name = first_text(root, &name);
    if name.is_empty() {
        return Ok(None);
    }

    let mut details = CompanyDetails {
        name,
        location: first_text(root, &location),
        about: first_text(root, &about),
        website: root
            .select(&website)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string),
        ..Default::default()
    };

    for line in root.select(&activity).map(text_of) {
        let lower = line.to_lowercase();
        if lower.starts_with("hiring since") {
            details.hiring_since = Some(line["hiring since".len()..].trim().to_string());
        } else if lower.contains("opportunities posted") {
            details.opportunities_posted = Some(line);
        } else if lower.contains("candidates hired") {
            details.candidates_hired = Some(line);
        }
    }

    Ok(Some(details))
}
