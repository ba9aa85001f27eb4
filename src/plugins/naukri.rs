use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{SourcePlugin, html_to_text, normalize_text};
use crate::browser::ResponseCapture;
use crate::models::{CompanyDetails, CompanyRef, Detail, Listing};

pub const DEFAULT_LISTING_URL: &str = "https://www.naukri.com/internship-jobs?k=internship";

const NAME: &str = "naukri";
const BASE_URL: &str = "https://www.naukri.com";

const SEARCH_API: &str = "jobapi/v3/search";
const JOB_API: &str = "jobapi/v4/job";
const COMPANY_API: &str = "companyapi/v1/company-group-data/desktop";

/// Browser-driven source: the site renders from internal JSON APIs, so each
/// call loads the public page and reads the API response it triggers.
pub struct NaukriPlugin {
    listing_url: String,
    capture: ResponseCapture,
}

impl NaukriPlugin {
    pub fn new(listing_url: impl Into<String>, capture: ResponseCapture) -> Self {
        Self {
            listing_url: listing_url.into(),
            capture,
        }
    }

    fn capture_json(&self, url: &str, pattern: &str) -> Result<Option<Value>> {
        let Some(body) = self.capture.capture(url, pattern)? else {
            return Ok(None);
        };
        let json = serde_json::from_str(&body)
            .with_context(|| format!("Response for {} is not JSON", pattern))?;
        Ok(Some(json))
    }
}

impl SourcePlugin for NaukriPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == "naukri.com" || h.ends_with(".naukri.com")))
            .unwrap_or(false)
    }

    fn fetch_listings(&self, url: Option<&str>) -> Result<Vec<Listing>> {
        let url = url.unwrap_or(&self.listing_url);
        info!(plugin = NAME, "Capturing search results from: {}", url);
        let listings = match self.capture_json(url, SEARCH_API)? {
            Some(json) => parse_listings(&json),
            None => Vec::new(),
        };
        info!(plugin = NAME, "Found {} listings", listings.len());
        Ok(listings)
    }

    fn fetch_details(&self, listing: &Listing) -> Option<Detail> {
        debug!(plugin = NAME, id = %listing.id, "Capturing details from {}", listing.link);
        match self.capture_json(&listing.link, JOB_API) {
            Ok(Some(json)) => parse_detail(&json),
            Ok(None) => None,
            Err(e) => {
                warn!(plugin = NAME, id = %listing.id, "Failed to fetch details: {:#}", e);
                None
            }
        }
    }

    fn fetch_company_details(&self, company: CompanyRef) -> Option<CompanyDetails> {
        let url = match company {
            CompanyRef::Inline(details) => return Some(details),
            CompanyRef::External(url) => url,
        };
        match self.capture_json(&url, COMPANY_API) {
            Ok(Some(json)) => parse_company(&json),
            Ok(None) => None,
            Err(e) => {
                warn!(plugin = NAME, "Failed to fetch company details from {}: {:#}", url, e);
                None
            }
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

fn placeholder(job: &Value, kind: &str) -> Option<String> {
    job.get("placeholders")?
        .as_array()?
        .iter()
        .find(|p| p.get("type").and_then(Value::as_str) == Some(kind))
        .and_then(|p| str_field(p, "label"))
        .map(str::to_string)
}

/// Reads `jobDetails[]` from a search API response. Entries without an id,
/// title or URL are skipped.
pub fn parse_listings(json: &Value) -> Vec<Listing> {
    let Some(jobs) = json.get("jobDetails").and_then(Value::as_array) else {
        warn!(plugin = NAME, "search response has no jobDetails");
        return Vec::new();
    };

    jobs.iter()
        .filter_map(|job| {
            let id = match job.get("jobId") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            let title = str_field(job, "title")?;
            let jd_url = str_field(job, "jdURL")?;

            Some(Listing {
                id,
                title: normalize_text(title),
                company: str_field(job, "companyName").map(normalize_text).unwrap_or_default(),
                location: placeholder(job, "location").unwrap_or_else(|| "Unknown".to_string()),
                link: format!("{}{}", BASE_URL, jd_url),
                stipend: placeholder(job, "salary").unwrap_or_else(|| "Not disclosed".to_string()),
                duration: placeholder(job, "duration").unwrap_or_else(|| "Unknown".to_string()),
                source: NAME.to_string(),
            })
        })
        .collect()
}

/// Reads a job API response. Company data is referenced by page URL when the
/// employer has one; otherwise the embedded `companyDetail` is carried inline.
pub fn parse_detail(json: &Value) -> Option<Detail> {
    let job = json.get("jobDetails")?;

    let description = str_field(job, "description").map(html_to_text).unwrap_or_default();
    if description.is_empty() {
        return None;
    }

    let mut meta = Vec::new();
    if let Some(exp) = job.get("experienceText").and_then(Value::as_str) {
        meta.push(format!("Experience: {}", exp));
    }
    if let Some(salary) = job
        .get("salaryDetail")
        .and_then(|s| s.get("label"))
        .and_then(Value::as_str)
    {
        meta.push(format!("Salary: {}", salary));
    }
    if let Some(locations) = job.get("locations").and_then(Value::as_array) {
        let names: Vec<&str> = locations
            .iter()
            .filter_map(|l| l.get("label").and_then(Value::as_str))
            .collect();
        if !names.is_empty() {
            meta.push(format!("Locations: {}", names.join(", ")));
        }
    }
    if let Some(skills) = job
        .get("keySkills")
        .and_then(|k| k.get("other"))
        .and_then(Value::as_array)
    {
        let labels: Vec<&str> = skills
            .iter()
            .filter_map(|s| s.get("label").and_then(Value::as_str))
            .collect();
        if !labels.is_empty() {
            meta.push(format!("Skills: {}", labels.join(", ")));
        }
    }
    if let Some(created) = str_field(job, "createdDate") {
        meta.push(format!("Posted: {}", created));
    }

    let company = match str_field(job, "companyPageUrl") {
        Some(page) => Some(CompanyRef::External(format!("{}/{}", BASE_URL, page.trim_start_matches('/')))),
        None => job.get("companyDetail").map(|c| {
            CompanyRef::Inline(CompanyDetails {
                name: str_field(c, "name").unwrap_or_default().to_string(),
                about: str_field(c, "details").map(html_to_text).unwrap_or_default(),
                location: str_field(c, "address").unwrap_or_default().to_string(),
                website: str_field(c, "websiteUrl").map(str::to_string),
                ..Default::default()
            })
        }),
    };

    Some(Detail {
        meta: meta.join("\n"),
        description,
        company,
    })
}

/// Reads the company-group API response from a company page.
pub fn parse_company(json: &Value) -> Option<CompanyDetails> {
    let name = str_field(json, "commonCompanyName")?;
    let sections = json.get("sections");
    let about = sections
        .and_then(|s| s.pointer("/aboutUs/data/description"))
        .and_then(Value::as_str)
        .map(html_to_text)
        .unwrap_or_default();
    let more_info = sections.and_then(|s| s.pointer("/moreInfo/data"));
    let info = |key: &str| more_info.and_then(|m| str_field(m, key)).map(str::to_string);

    Some(CompanyDetails {
        name: name.to_string(),
        location: info("Headquarters").unwrap_or_default(),
        about,
        industry: json
            .get("tags")
            .and_then(Value::as_array)
            .and_then(|tags| tags.first())
            .and_then(Value::as_str)
            .map(str::to_string),
        size: info("Company Size"),
        website: info("Website"),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_listings() {
        let json = json!({
            "jobDetails": [
                {
                    "jobId": "101",
                    "title": "Rust  Intern",
                    "companyName": "Acme",
                    "jdURL": "/job-listings-rust-intern-101",
                    "placeholders": [
                        { "type": "location", "label": "Bengaluru" },
                        { "type": "salary", "label": "15k/month" }
                    ]
                },
                { "jobId": "102", "companyName": "No title" },
                { "jobId": 103, "title": "Numeric id", "jdURL": "/job-103" }
            ]
        });
        let listings = parse_listings(&json);
        assert_eq!(listings.len(), 2);

        assert_eq!(listings[0].id, "101");
        assert_eq!(listings[0].title, "Rust Intern");
        assert_eq!(listings[0].link, "https://www.naukri.com/job-listings-rust-intern-101");
        assert_eq!(listings[0].location, "Bengaluru");
        assert_eq!(listings[0].stipend, "15k/month");
        assert_eq!(listings[0].duration, "Unknown");
        assert_eq!(listings[0].source, "naukri");

        assert_eq!(listings[1].id, "103");
        assert_eq!(listings[1].stipend, "Not disclosed");
    }

    #[test]
    fn test_parse_listings_without_job_details() {
        assert!(parse_listings(&json!({ "noOfJobs": 0 })).is_empty());
    }

    #[test]
    fn test_parse_detail_with_company_page() {
        let json = json!({
            "jobDetails": {
                "description": "<p>Build services</p><ul><li>Rust</li></ul>",
                "keySkills": { "other": [{ "label": "Rust" }, { "label": "Kafka" }] },
                "locations": [{ "label": "Pune" }],
                "companyPageUrl": "acme-jobs-careers-123",
                "companyDetail": { "name": "Acme" }
            }
        });
        let detail = parse_detail(&json).unwrap();
        assert_eq!(detail.description, "Build services\nRust");
        assert!(detail.meta.contains("Skills: Rust, Kafka"));
        assert!(detail.meta.contains("Locations: Pune"));
        assert_eq!(
            detail.company,
            Some(CompanyRef::External("https://www.naukri.com/acme-jobs-careers-123".to_string()))
        );
    }

    #[test]
    fn test_parse_detail_carries_inline_company() {
        let json = json!({
            "jobDetails": {
                "description": "Do things",
                "companyDetail": {
                    "name": "Tiny Startup",
                    "details": "<p>We are small.</p>",
                    "address": "Delhi"
                }
            }
        });
        let detail = parse_detail(&json).unwrap();
        match &detail.company {
            Some(CompanyRef::Inline(company)) => {
                assert_eq!(company.name, "Tiny Startup");
                assert_eq!(company.about, "We are small.");
                assert_eq!(company.location, "Delhi");
            }
            other => panic!("expected inline company, got {:?}", other),
        }
        assert_eq!(detail.company_detail_page_url(), None);
    }

    #[test]
    fn test_parse_detail_without_description() {
        assert!(parse_detail(&json!({ "jobDetails": {} })).is_none());
        assert!(parse_detail(&json!({})).is_none());
    }

    #[test]
    fn test_parse_company() {
        let json = json!({
            "commonCompanyName": "Acme Corp",
            "tags": ["IT Services", "Consulting"],
            "sections": {
                "aboutUs": { "data": { "description": "Anvils since 1949." } },
                "moreInfo": { "data": {
                    "Headquarters": "Mumbai",
                    "Company Size": "1001-5000",
                    "Website": "https://acme.example"
                } }
            }
        });
        let company = parse_company(&json).unwrap();
        assert_eq!(company.name, "Acme Corp");
        assert_eq!(company.about, "Anvils since 1949.");
        assert_eq!(company.location, "Mumbai");
        assert_eq!(company.industry.as_deref(), Some("IT Services"));
        assert_eq!(company.size.as_deref(), Some("1001-5000"));
        assert_eq!(company.website.as_deref(), Some("https://acme.example"));
    }

    #[test]
    fn test_parse_company_requires_name() {
        assert!(parse_company(&json!({ "sections": {} })).is_none());
    }

    #[test]
    fn test_can_handle() {
        let plugin = NaukriPlugin::new(
            DEFAULT_LISTING_URL,
            ResponseCapture::new(std::time::Duration::from_secs(10), true),
        );
        assert!(plugin.can_handle("https://www.naukri.com/python-jobs"));
        assert!(!plugin.can_handle("https://internshala.com/internships"));
    }
}
