use std::collections::HashSet;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ai::{AiService, StructuredResume};
use crate::error::{Error, Result};
use crate::models::{CompanyDetails, CompanyRecord, CompanyRef, Internship, Listing, normalize_company};
use crate::plugins::SourcePlugin;
use crate::registry::Registry;
use crate::store::{RunLock, Store};

/// One step of a run's progress stream. Every stream ends with `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunEvent {
    Status {
        message: String,
    },
    Internship {
        internship: Internship,
        company: Option<CompanyRecord>,
    },
    Complete {
        message: String,
    },
    Error {
        message: String,
    },
}

impl RunEvent {
    fn status(message: impl Into<String>) -> Self {
        RunEvent::Status {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingListings,
    Filtering,
    PerListing { index: usize, total: usize },
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub new: usize,
    pub saved: usize,
    pub skipped: usize,
}

/// A known employer as shown in the company list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub name: String,
    pub record: Option<CompanyRecord>,
    pub blacklisted: bool,
    pub internships: usize,
}

/// Sequences discovery, filtering, enrichment and persistence for one store.
pub struct Orchestrator {
    store: Store,
    registry: Registry,
    ai: AiService,
    listing_delay: Duration,
    phase: RunPhase,
}

impl Orchestrator {
    pub fn new(store: Store, registry: Registry, ai: AiService, listing_delay: Duration) -> Self {
        Self {
            store,
            registry,
            ai,
            listing_delay,
            phase: RunPhase::Idle,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Runs the pipeline on a worker thread. The receiver yields events in order;
    /// dropping it does not stop the run. Joining the handle returns the orchestrator.
    pub fn start_run(self, preset: Option<String>, resume: String) -> (mpsc::Receiver<RunEvent>, JoinHandle<Self>) {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut orchestrator = self;
            orchestrator.run(preset.as_deref(), &resume, &mut |event| {
                // The run continues even if the receiver is gone
                let _ = tx.send(event);
            });
            orchestrator
        });
        (rx, handle)
    }

    /// Runs the pipeline on the calling thread, reporting progress through `emit`.
    pub fn run(&mut self, preset: Option<&str>, resume: &str, emit: &mut dyn FnMut(RunEvent)) -> RunSummary {
        self.phase = RunPhase::Idle;
        let mut summary = RunSummary::default();

        let (_lock, urls) = match self.prepare(preset) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("run setup failed: {}", e);
                self.phase = RunPhase::Failed;
                emit(RunEvent::Error { message: e.to_string() });
                return summary;
            }
        };

        self.phase = RunPhase::FetchingListings;
        let listings = match &urls {
            Some(urls) => {
                emit(RunEvent::status(format!(
                    "Fetching listings from preset '{}' ({} URLs)...",
                    preset.unwrap_or_default(),
                    urls.len()
                )));
                self.registry.fetch_from_urls(urls)
            }
            None => {
                emit(RunEvent::status("Fetching listings from all sources..."));
                self.registry.fetch_all()
            }
        };
        summary.discovered = listings.len();

        self.phase = RunPhase::Filtering;
        let fresh = self.filter_new(listings);
        summary.new = fresh.len();
        emit(RunEvent::status(format!(
            "Found {} new listings ({} discovered).",
            summary.new, summary.discovered
        )));

        let total = fresh.len();
        for (index, listing) in fresh.iter().enumerate() {
            self.phase = RunPhase::PerListing { index, total };
            match self.process_listing(listing, resume, emit) {
                Ok(true) => summary.saved += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    error!(id = %listing.id, "run aborted: {}", e);
                    self.phase = RunPhase::Failed;
                    emit(RunEvent::Error {
                        message: format!("Run aborted while saving '{}': {}", listing.title, e),
                    });
                    return summary;
                }
            }

            if index + 1 < total {
                thread::sleep(self.listing_delay);
            }
        }

        self.phase = RunPhase::Complete;
        let message = format!(
            "Run complete: {} saved, {} skipped, {} already known.",
            summary.saved,
            summary.skipped,
            summary.discovered - summary.new
        );
        info!("{}", message);
        emit(RunEvent::Complete { message });
        summary
    }

    fn prepare(&mut self, preset: Option<&str>) -> Result<(RunLock, Option<Vec<String>>)> {
        self.store.reload()?;
        let lock = self.store.lock_run()?;
        let urls = match preset {
            Some(name) => Some(self.store.preset(name)?.to_vec()),
            None => None,
        };
        Ok((lock, urls))
    }

    /// Drops listings that are already stored, repeated within the batch, or blacklisted.
    fn filter_new(&self, listings: Vec<Listing>) -> Vec<Listing> {
        let mut batch = HashSet::new();
        listings
            .into_iter()
            .filter(|listing| {
                if self.store.is_processed(&listing.id) {
                    return false;
                }
                if self.store.is_blacklisted(&listing.company) {
                    debug!(id = %listing.id, company = %listing.company, "skipping blacklisted company");
                    return false;
                }
                batch.insert(listing.id.clone())
            })
            .collect()
    }

    /// Returns Ok(false) when the listing was skipped. Only store failures are errors.
    fn process_listing(&mut self, listing: &Listing, resume: &str, emit: &mut dyn FnMut(RunEvent)) -> Result<bool> {
        let plugin = match self.registry.get(&listing.source) {
            Ok(plugin) => plugin,
            Err(e) => {
                warn!(id = %listing.id, "{}", e);
                emit(RunEvent::status(format!("Skipping '{}': {}", listing.title, e)));
                return Ok(false);
            }
        };

        emit(RunEvent::status(format!(
            "Processing '{}' at {}...",
            listing.title, listing.company
        )));

        let Some(detail) = plugin.fetch_details(listing) else {
            emit(RunEvent::status(format!(
                "Could not fetch details for '{}', skipping.",
                listing.title
            )));
            return Ok(false);
        };

        let extraction = self.ai.extract_and_match(&detail.meta, &detail.description, resume);
        if extraction.is_none() {
            debug!(id = %listing.id, "no AI extraction, keeping raw description");
        }

        let mut internship = Internship::from_listing(listing, &detail.description);
        internship.company_detail_page_url = detail.company_detail_page_url().map(str::to_string);

        let company = resolve_company(&mut self.store, plugin, &self.ai, &listing.company, detail.company)?;

        if let Some(extraction) = extraction {
            internship.apply_extracted(&extraction.details);
            internship.match_analysis = Some(extraction.match_analysis);
        }

        let id = internship.id.clone();
        self.store.save_internship(internship.clone())?;
        let internship = self.store.get_internship(&id).cloned().unwrap_or(internship);

        emit(RunEvent::Internship { internship, company });
        Ok(true)
    }

    /// Re-runs whatever enrichment a stored internship is missing, without re-scraping it.
    pub fn retry_enrichment(&mut self, id: &str, resume: &str) -> Result<Internship> {
        self.store.reload()?;
        let mut internship = self
            .store
            .get_internship(id)
            .cloned()
            .ok_or_else(|| Error::UnknownInternship(id.to_string()))?;

        if internship.match_analysis.is_none() {
            info!(id, "retrying extraction and match");
            let meta = stored_meta(&internship);
            if let Some(extraction) = self.ai.extract_and_match(&meta, &internship.description, resume) {
                internship.apply_extracted(&extraction.details);
                internship.match_analysis = Some(extraction.match_analysis);
            }
        }

        let company = normalize_company(&internship.company);
        if !company.is_empty() {
            let cached = self.store.company(&company).cloned();
            if cached.as_ref().is_none_or(|record| record.analysis.is_none()) {
                info!(id, company = %company, "retrying company analysis");
                let details = match cached {
                    Some(record) => record.details,
                    None => self.fetch_stored_company(&internship),
                };
                let location = details
                    .as_ref()
                    .map(|d| d.location.as_str())
                    .filter(|l| !l.trim().is_empty())
                    .or(Some(internship.location.as_str()).filter(|l| !l.trim().is_empty()));
                let analysis = self
                    .ai
                    .analyze_company(&company, location, details.as_ref().map(|d| d.about.as_str()));
                self.store.save_company(&company, details, analysis)?;
            }
        }

        self.store.update_internship(internship)?;
        self.store
            .get_internship(id)
            .cloned()
            .ok_or_else(|| Error::UnknownInternship(id.to_string()))
    }

    fn fetch_stored_company(&self, internship: &Internship) -> Option<CompanyDetails> {
        let url = internship.company_detail_page_url.clone()?;
        match self.registry.get(&internship.source) {
            Ok(plugin) => plugin.fetch_company_details(CompanyRef::External(url)),
            Err(e) => {
                warn!(id = %internship.id, "cannot fetch company details: {}", e);
                None
            }
        }
    }

    /// Re-analyzes a company, replacing its cached analysis.
    pub fn regenerate_company(&mut self, name: &str) -> Result<CompanyRecord> {
        let name = normalize_company(name);
        let cached = self.store.company(&name).cloned();
        let known = cached.is_some() || self.store.internship_counts().contains_key(&name);
        if !known {
            return Err(Error::UnknownCompany(name));
        }

        let (details, previous) = match cached {
            Some(record) => (record.details, record.analysis),
            None => (None, None),
        };
        let analysis = self.ai.analyze_company(
            &name,
            details.as_ref().map(|d| d.location.as_str()),
            details.as_ref().map(|d| d.about.as_str()),
        );
        if analysis.is_none() {
            warn!(company = %name, "analysis unavailable, keeping the previous one");
        }
        self.store.save_company(&name, details, analysis.or(previous))
    }

    /// Adds or updates a company by hand, analyzing it if it has no analysis yet.
    pub fn add_company(&mut self, name: &str, location: &str, about: &str) -> Result<CompanyRecord> {
        let name = normalize_company(name);
        let cached = self.store.company(&name).cloned();
        let mut details = CompanyDetails {
            name: name.clone(),
            location: location.trim().to_string(),
            about: about.trim().to_string(),
            ..Default::default()
        };

        let mut analysis = None;
        if let Some(record) = cached {
            if let Some(older) = &record.details {
                details = details.or_from(older);
            }
            analysis = record.analysis;
        }
        if analysis.is_none() {
            analysis = self.ai.analyze_company(&name, Some(&details.location), Some(&details.about));
        }
        self.store.save_company(&name, Some(details), analysis)
    }

    /// Every company known from the cache or from stored internships.
    pub fn companies(&self) -> Vec<CompanySummary> {
        let counts = self.store.internship_counts();
        let mut names: Vec<&String> = self.store.companies().keys().chain(counts.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(|name| CompanySummary {
                name: name.clone(),
                record: self.store.company(name).cloned(),
                blacklisted: self.store.is_blacklisted(name),
                internships: counts.get(name).copied().unwrap_or(0),
            })
            .collect()
    }

    /// Tailors a resume to a stored internship. `Ok(None)` when the AI gave nothing back.
    pub fn tailor(&self, id: &str, resume: &str, profile: Option<&str>) -> Result<Option<StructuredResume>> {
        let internship = self
            .store
            .get_internship(id)
            .ok_or_else(|| Error::UnknownInternship(id.to_string()))?;

        let mut job = format!(
            "{} at {}\n{}\n\n{}",
            internship.title,
            internship.company,
            stored_meta(internship),
            internship.description
        );
        if !internship.skills.is_empty() {
            job.push_str(&format!("\n\nSkills: {}", internship.skills.join(", ")));
        }
        if let Some(about) = self
            .store
            .company(&internship.company)
            .and_then(|record| record.details.as_ref())
            .map(|details| details.about.as_str())
            .filter(|about| !about.trim().is_empty())
        {
            job.push_str(&format!("\n\nAbout the company: {}", about));
        }

        Ok(self.ai.tailor_resume(&job, resume, profile))
    }
}

/// Cache hit: reuse as-is. Miss: fetch through the owning plugin, analyze, persist.
fn resolve_company(
    store: &mut Store,
    plugin: &dyn SourcePlugin,
    ai: &AiService,
    company: &str,
    reference: Option<CompanyRef>,
) -> Result<Option<CompanyRecord>> {
    let name = normalize_company(company);
    if name.is_empty() {
        return Ok(None);
    }
    if let Some(record) = store.company(&name) {
        debug!(company = %name, "company cache hit");
        return Ok(Some(record.clone()));
    }

    let details = reference.and_then(|reference| plugin.fetch_company_details(reference));
    let analysis = ai.analyze_company(
        &name,
        details.as_ref().map(|d| d.location.as_str()),
        details.as_ref().map(|d| d.about.as_str()),
    );
    store.save_company(&name, details, analysis).map(Some)
}

fn stored_meta(internship: &Internship) -> String {
    let mut lines = vec![
        format!("Location: {}", internship.location),
        format!("Stipend: {}", internship.stipend),
        format!("Duration: {}", internship.duration),
    ];
    if let Some(apply_by) = &internship.apply_by {
        lines.push(format!("Apply by: {}", apply_by));
    }
    if let Some(posted_on) = &internship.posted_on {
        lines.push(format!("Posted on: {}", posted_on));
    }
    lines.join("\n")
}
