use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::Listing;
use crate::plugins::SourcePlugin;

/// Ordered set of source plugins. Registration order decides URL ownership.
#[derive(Default)]
pub struct Registry {
    plugins: Vec<Box<dyn SourcePlugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn SourcePlugin>) -> Result<()> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(Error::DuplicatePlugin(plugin.name().to_string()));
        }
        info!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn SourcePlugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| &**p)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))
    }

    /// First registered plugin that claims `url`.
    pub fn resolve_url(&self, url: &str) -> Option<&dyn SourcePlugin> {
        self.plugins.iter().find(|p| p.can_handle(url)).map(|p| &**p)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Default discovery: every plugin's own listing page.
    pub fn fetch_all(&self) -> Vec<Listing> {
        let mut all = Vec::new();
        for plugin in &self.plugins {
            all.extend(collect(plugin.as_ref(), None));
        }
        all
    }

    /// Preset discovery: each URL goes to the plugin that owns it. Unowned URLs are skipped.
    pub fn fetch_from_urls(&self, urls: &[String]) -> Vec<Listing> {
        let mut all = Vec::new();
        for url in urls {
            match self.resolve_url(url) {
                Some(plugin) => all.extend(collect(plugin, Some(url))),
                None => warn!("No plugin can handle {}, skipping", url),
            }
        }
        all
    }
}

fn collect(plugin: &dyn SourcePlugin, url: Option<&str>) -> Vec<Listing> {
    match plugin.fetch_listings(url) {
        Ok(listings) => listings,
        Err(e) => {
            warn!(plugin = plugin.name(), "fetching listings failed: {:#}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    use crate::models::{CompanyDetails, CompanyRef, Detail, Listing};
    use crate::plugins::SourcePlugin;

    /// Call counters shared between a test and its fake plugin.
    #[derive(Clone, Default)]
    pub struct Counters {
        pub listings: Arc<AtomicUsize>,
        pub details: Arc<AtomicUsize>,
        pub companies: Arc<AtomicUsize>,
    }

    impl Counters {
        pub fn details(&self) -> usize {
            self.details.load(Ordering::SeqCst)
        }

        pub fn companies(&self) -> usize {
            self.companies.load(Ordering::SeqCst)
        }
    }

    /// In-memory plugin serving fixed listings.
    pub struct FakePlugin {
        pub name: String,
        pub domain: String,
        pub listings: Vec<Listing>,
        pub fail_listings: bool,
        /// Listing ids whose detail fetch returns `None`.
        pub missing_details: Vec<String>,
        pub inline_companies: HashMap<String, CompanyDetails>,
        pub counters: Counters,
        pub requested_urls: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl FakePlugin {
        pub fn new(name: &str, listings: Vec<Listing>) -> Self {
            Self {
                name: name.to_string(),
                domain: format!("{}.example", name),
                listings,
                fail_listings: false,
                missing_details: Vec::new(),
                inline_companies: HashMap::new(),
                counters: Counters::default(),
                requested_urls: Arc::default(),
            }
        }
    }

    pub fn listing(source: &str, id: &str, company: &str) -> Listing {
        Listing {
            id: id.to_string(),
            title: format!("Intern {}", id),
            company: company.to_string(),
            location: "Remote".to_string(),
            link: format!("https://{}.example/jobs/{}", source, id),
            stipend: "10,000 /month".to_string(),
            duration: "3 Months".to_string(),
            source: source.to_string(),
        }
    }

    impl SourcePlugin for FakePlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn can_handle(&self, url: &str) -> bool {
            url.contains(&self.domain)
        }

        fn fetch_listings(&self, url: Option<&str>) -> anyhow::Result<Vec<Listing>> {
            self.counters.listings.fetch_add(1, Ordering::SeqCst);
            self.requested_urls.lock().unwrap().push(url.map(str::to_string));
            if self.fail_listings {
                return Err(anyhow!("{} is down", self.name));
            }
            Ok(self.listings.clone())
        }

        fn fetch_details(&self, listing: &Listing) -> Option<Detail> {
            self.counters.details.fetch_add(1, Ordering::SeqCst);
            if self.missing_details.contains(&listing.id) {
                return None;
            }
            let company = match self.inline_companies.get(&listing.id) {
                Some(details) => CompanyRef::Inline(details.clone()),
                None => CompanyRef::External(format!("https://{}/company/{}", self.domain, listing.company)),
            };
            Some(Detail {
                meta: format!("Stipend: {}", listing.stipend),
                description: format!("Raw description for {}", listing.id),
                company: Some(company),
            })
        }

        fn fetch_company_details(&self, company: CompanyRef) -> Option<CompanyDetails> {
            self.counters.companies.fetch_add(1, Ordering::SeqCst);
            match company {
                CompanyRef::Inline(details) => Some(details),
                CompanyRef::External(url) => Some(CompanyDetails {
                    name: url.rsplit('/').next().unwrap_or_default().to_string(),
                    about: format!("Fetched from {}", url),
                    ..Default::default()
                }),
            }
        }
    }
}
