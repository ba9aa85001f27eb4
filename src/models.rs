use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A listing as discovered by a source plugin. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub stipend: String,
    pub duration: String,
    pub source: String, // plugin name, used to route detail/company calls
}

/// The persisted, enriched form of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Internship {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub stipend: String,
    pub duration: String,
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_analysis: Option<MatchAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_detail_page_url: Option<String>,
    #[serde(default)]
    pub seen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_on: Option<DateTime<Utc>>,
}

impl Internship {
    /// Starts an unenriched record from a listing and the raw detail text.
    pub fn from_listing(listing: &Listing, description: &str) -> Self {
        Self {
            id: listing.id.clone(),
            title: listing.title.clone(),
            company: listing.company.clone(),
            location: listing.location.clone(),
            link: listing.link.clone(),
            stipend: listing.stipend.clone(),
            duration: listing.duration.clone(),
            source: listing.source.clone(),
            description: description.to_string(),
            skills: Vec::new(),
            posted_on: None,
            apply_by: None,
            location_type: None,
            ppo: None,
            match_analysis: None,
            company_detail_page_url: None,
            seen: false,
            saved_on: None,
        }
    }

    /// Overlays AI-extracted fields. Blank extracted values keep the scraped ones.
    ///
    /// The company name is never replaced; it is the blacklist and company-cache key.
    pub fn apply_extracted(&mut self, details: &ExtractedDetails) {
        fn overlay(target: &mut String, value: &str) {
            if !value.trim().is_empty() {
                *target = value.trim().to_string();
            }
        }
        fn overlay_opt(target: &mut Option<String>, value: &str) {
            if !value.trim().is_empty() {
                *target = Some(value.trim().to_string());
            }
        }

        overlay(&mut self.description, &details.description);
        overlay(&mut self.stipend, &details.stipend);
        overlay(&mut self.location, &details.location);
        overlay(&mut self.duration, &details.duration);
        overlay_opt(&mut self.location_type, &details.location_type);
        overlay_opt(&mut self.apply_by, &details.apply_by);
        overlay_opt(&mut self.posted_on, &details.posted_on);
        if details.ppo.is_some() {
            self.ppo = details.ppo;
        }
        if !details.skills.is_empty() {
            self.skills = details.skills.clone();
        }
    }
}

/// Structured fields the AI pulls out of a raw posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedDetails {
    pub description: String,
    pub stipend: String,
    pub company: String,
    pub location: String,
    pub location_type: String,
    pub duration: String,
    pub ppo: Option<bool>,
    pub skills: Vec<String>,
    pub apply_by: String,
    pub posted_on: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Good Match")]
    Good,
    #[serde(rename = "Average Match")]
    Average,
    #[serde(rename = "Poor Match")]
    Poor,
    #[serde(rename = "No Resume")]
    NoResume,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Good => "Good Match",
            Verdict::Average => "Average Match",
            Verdict::Poor => "Poor Match",
            Verdict::NoResume => "No Resume",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAnalysis {
    pub score: u32,
    pub verdict: Verdict,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

/// What a plugin knows about an employer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub about: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, alias = "websiteLink", skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hiring_since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunities_posted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_hired: Option<String>,
}

impl CompanyDetails {
    /// Fills blank fields from `older`, keeping anything already set here.
    pub fn or_from(mut self, older: &CompanyDetails) -> Self {
        fn keep(target: &mut String, older: &str) {
            if target.trim().is_empty() {
                *target = older.to_string();
            }
        }
        keep(&mut self.name, &older.name);
        keep(&mut self.location, &older.location);
        keep(&mut self.about, &older.about);
        self.industry = self.industry.or_else(|| older.industry.clone());
        self.size = self.size.or_else(|| older.size.clone());
        self.website = self.website.or_else(|| older.website.clone());
        self.hiring_since = self.hiring_since.or_else(|| older.hiring_since.clone());
        self.opportunities_posted = self
            .opportunities_posted
            .or_else(|| older.opportunities_posted.clone());
        self.candidates_hired = self.candidates_hired.or_else(|| older.candidates_hired.clone());
        self
    }
}

/// Cached trust data for one employer, keyed by normalized company name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<CompanyDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub saved_on: DateTime<Utc>,
}

/// Where company details for a posting can be obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum CompanyRef {
    /// A company page the owning plugin knows how to fetch.
    External(String),
    /// Company data already carried in the detail payload.
    Inline(CompanyDetails),
}

/// Raw posting text returned by `SourcePlugin::fetch_details`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub meta: String,
    pub description: String,
    pub company: Option<CompanyRef>,
}

impl Detail {
    pub fn company_detail_page_url(&self) -> Option<&str> {
        match &self.company {
            Some(CompanyRef::External(url)) => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SeenFilter {
    #[default]
    All,
    Seen,
    Unseen,
}

impl SeenFilter {
    pub fn accepts(&self, internship: &Internship) -> bool {
        match self {
            SeenFilter::All => true,
            SeenFilter::Seen => internship.seen,
            SeenFilter::Unseen => !internship.seen,
        }
    }
}

/// Trims and collapses inner whitespace so cache and blacklist keys line up.
pub fn normalize_company(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        Listing {
            id: "42".to_string(),
            title: "Backend Intern".to_string(),
            company: "Acme Labs".to_string(),
            location: "Remote".to_string(),
            link: "https://example.com/42".to_string(),
            stipend: "10,000 /month".to_string(),
            duration: "3 Months".to_string(),
            source: "internshala".to_string(),
        }
    }

    #[test]
    fn test_apply_extracted_keeps_company_and_blank_fields() {
        let mut internship = Internship::from_listing(&listing(), "raw text");
        let details = ExtractedDetails {
            description: "**Build APIs**".to_string(),
            company: "ACME LABS PVT LTD".to_string(),
            location: "  ".to_string(),
            duration: "6 Months".to_string(),
            skills: vec!["Rust".to_string()],
            ppo: Some(true),
            ..Default::default()
        };
        internship.apply_extracted(&details);

        assert_eq!(internship.company, "Acme Labs");
        assert_eq!(internship.location, "Remote");
        assert_eq!(internship.duration, "6 Months");
        assert_eq!(internship.description, "**Build APIs**");
        assert_eq!(internship.skills, vec!["Rust"]);
        assert_eq!(internship.ppo, Some(true));
        assert_eq!(internship.apply_by, None);
    }

    #[test]
    fn test_internship_json_uses_camel_case() {
        let mut internship = Internship::from_listing(&listing(), "text");
        internship.company_detail_page_url = Some("https://example.com/c".to_string());
        let json = serde_json::to_value(&internship).unwrap();
        assert_eq!(json["companyDetailPageUrl"], "https://example.com/c");
        assert_eq!(json["seen"], false);
        assert!(json.get("matchAnalysis").is_none());
    }

    #[test]
    fn test_verdict_serializes_as_label() {
        let json = serde_json::to_string(&Verdict::NoResume).unwrap();
        assert_eq!(json, "\"No Resume\"");
        let parsed: Verdict = serde_json::from_str("\"Good Match\"").unwrap();
        assert_eq!(parsed, Verdict::Good);
        assert_eq!(parsed.label(), "Good Match");
    }

    #[test]
    fn test_company_details_accepts_website_link_alias() {
        let details: CompanyDetails =
            serde_json::from_str(r#"{"name":"Acme","websiteLink":"https://acme.io"}"#).unwrap();
        assert_eq!(details.website.as_deref(), Some("https://acme.io"));
    }

    #[test]
    fn test_company_details_or_from_fills_blanks() {
        let older = CompanyDetails {
            name: "Acme".to_string(),
            location: "Pune".to_string(),
            about: "Old about".to_string(),
            size: Some("Small".to_string()),
            ..Default::default()
        };
        let newer = CompanyDetails {
            name: "Acme".to_string(),
            about: "New about".to_string(),
            ..Default::default()
        };
        let merged = newer.or_from(&older);
        assert_eq!(merged.about, "New about");
        assert_eq!(merged.location, "Pune");
        assert_eq!(merged.size.as_deref(), Some("Small"));
    }

    #[test]
    fn test_normalize_company() {
        assert_eq!(normalize_company("  Acme   Labs \n"), "Acme Labs");
        assert_eq!(normalize_company(""), "");
    }

    #[test]
    fn test_seen_filter() {
        let mut internship = Internship::from_listing(&listing(), "");
        assert!(SeenFilter::Unseen.accepts(&internship));
        internship.seen = true;
        assert!(SeenFilter::Seen.accepts(&internship));
        assert!(SeenFilter::All.accepts(&internship));
        assert!(!SeenFilter::Unseen.accepts(&internship));
    }
}
