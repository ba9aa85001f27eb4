//! Job-board sources.
//!
//! A plugin knows how to list postings on one board, fetch the detail text for a
//! posting, and fetch what the board says about the employer. Plugins are
//! stateless between calls; company data seen while fetching details travels
//! back to the caller inside [`Detail`] instead of being held here.

mod internshala;
mod naukri;

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{CompanyDetails, CompanyRef, Detail, Listing};

pub use internshala::{DEFAULT_LISTING_URL as INTERNSHALA_DEFAULT_URL, InternshalaPlugin};
pub use naukri::{DEFAULT_LISTING_URL as NAUKRI_DEFAULT_URL, NaukriPlugin};

pub trait SourcePlugin: Send + Sync {
    /// Stable identifier, stored on every listing as `source`.
    fn name(&self) -> &str;

    /// Whether this plugin owns the given listing-page URL.
    fn can_handle(&self, url: &str) -> bool;

    /// One page of results from `url`, or from the plugin's default page.
    ///
    /// Malformed entries are skipped individually. An `Err` means the page
    /// itself could not be read; callers treat it as an empty result.
    fn fetch_listings(&self, url: Option<&str>) -> anyhow::Result<Vec<Listing>>;

    /// `None` when the posting could not be read.
    fn fetch_details(&self, listing: &Listing) -> Option<Detail>;

    /// Inline references are returned as-is; external ones are fetched.
    fn fetch_company_details(&self, company: CompanyRef) -> Option<CompanyDetails>;
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static HTML_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</li>|</h\d>|</div>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Collapses all runs of whitespace to single spaces.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Flattens an HTML fragment to plain text, one block element per line.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = HTML_BREAK.replace_all(html, "\n");
    let stripped = HTML_TAG.replace_all(&with_breaks, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded
        .lines()
        .map(normalize_text)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Work \n\n from\thome "), "Work from home");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>About the role</p><ul><li>Build <b>APIs</b></li><li>Ship &amp; test</li></ul>";
        assert_eq!(html_to_text(html), "About the role\nBuild APIs\nShip & test");
    }
}
