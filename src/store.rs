use std::collections::BTreeMap;
use std::fs::{self, File, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{normalize_company, CompanyDetails, CompanyRecord, Internship, SeenFilter};

const INTERNSHIPS_FILE: &str = "internships.json";
const BLACKLIST_FILE: &str = "blacklist.json";
const COMPANIES_FILE: &str = "companies.json";
const PRESETS_FILE: &str = "presets.json";
const LOCK_FILE: &str = "run.lock";

/// JSON-file backed record sets. Every mutation writes the updated snapshot to
/// disk first and only then replaces the in-memory copy, so a failed write
/// leaves both unchanged.
///
/// A `Store` only exists after a successful [`Store::load`], so there is no
/// "not loaded yet" state to check for.
pub struct Store {
    dir: PathBuf,
    internships: Vec<Internship>,
    blacklist: Vec<String>,
    companies: BTreeMap<String, CompanyRecord>,
    presets: BTreeMap<String, Vec<String>>,
}

impl Store {
    pub fn default_dir() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "internhunt") {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("hunt-data")
        }
    }

    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io("create", &dir, e))?;

        let mut store = Self {
            dir,
            internships: Vec::new(),
            blacklist: Vec::new(),
            companies: BTreeMap::new(),
            presets: BTreeMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-reads every record set from disk. Missing files load as empty.
    pub fn reload(&mut self) -> Result<()> {
        self.internships = read_json(&self.dir.join(INTERNSHIPS_FILE))?;
        self.blacklist = read_json(&self.dir.join(BLACKLIST_FILE))?;
        self.companies = read_json(&self.dir.join(COMPANIES_FILE))?;
        self.presets = read_json(&self.dir.join(PRESETS_FILE))?;

        info!(
            internships = self.internships.len(),
            blacklisted = self.blacklist.len(),
            companies = self.companies.len(),
            presets = self.presets.len(),
            "store loaded from {}",
            self.dir.display()
        );
        Ok(())
    }

    // --- Internship operations ---

    /// The dedup gate: true once an internship with this id has been stored.
    pub fn is_processed(&self, id: &str) -> bool {
        self.internships.iter().any(|item| item.id == id)
    }

    /// Appends a new internship. Returns false (and writes nothing) if the id exists.
    pub fn save_internship(&mut self, internship: Internship) -> Result<bool> {
        if self.is_processed(&internship.id) {
            debug!(id = %internship.id, "internship already stored, skipping save");
            return Ok(false);
        }

        let title = internship.title.clone();
        let mut next = self.internships.clone();
        next.push(Internship {
            seen: false,
            saved_on: Some(Utc::now()),
            ..internship
        });
        self.commit_internships(next)?;
        info!("Saved internship: {}", title);
        Ok(true)
    }

    /// Replaces an existing record's content, keeping its seen flag and save time.
    pub fn update_internship(&mut self, internship: Internship) -> Result<()> {
        let mut next = self.internships.clone();
        let existing = next
            .iter_mut()
            .find(|item| item.id == internship.id)
            .ok_or_else(|| Error::UnknownInternship(internship.id.clone()))?;

        let seen = existing.seen;
        let saved_on = existing.saved_on;
        *existing = Internship {
            seen,
            saved_on,
            ..internship
        };
        self.commit_internships(next)
    }

    pub fn get_internship(&self, id: &str) -> Option<&Internship> {
        self.internships.iter().find(|item| item.id == id)
    }

    /// Stored internships from non-blacklisted companies, newest first.
    pub fn internships(&self, filter: SeenFilter) -> Vec<&Internship> {
        self.internships
            .iter()
            .rev()
            .filter(|item| !self.is_blacklisted(&item.company))
            .filter(|item| filter.accepts(item))
            .collect()
    }

    /// Stored internships per normalized company name, blacklisted ones included.
    pub fn internship_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.internships {
            *counts.entry(normalize_company(&item.company)).or_insert(0) += 1;
        }
        counts
    }

    /// Flips the seen flag and returns the new value.
    pub fn toggle_seen(&mut self, id: &str) -> Result<bool> {
        let mut next = self.internships.clone();
        let internship = next
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::UnknownInternship(id.to_string()))?;
        internship.seen = !internship.seen;
        let seen = internship.seen;

        self.commit_internships(next)?;
        info!("Toggled seen for {} to {}", id, seen);
        Ok(seen)
    }

    pub fn delete_internship(&mut self, id: &str) -> Result<()> {
        let mut next = self.internships.clone();
        next.retain(|item| item.id != id);
        if next.len() == self.internships.len() {
            return Err(Error::UnknownInternship(id.to_string()));
        }

        self.commit_internships(next)?;
        info!("Deleted internship {}", id);
        Ok(())
    }

    // --- Company cache ---

    pub fn company(&self, name: &str) -> Option<&CompanyRecord> {
        self.companies.get(&normalize_company(name))
    }

    pub fn companies(&self) -> &BTreeMap<String, CompanyRecord> {
        &self.companies
    }

    /// Upserts a company record, overwriting whatever was cached before.
    pub fn save_company(
        &mut self,
        name: &str,
        details: Option<CompanyDetails>,
        analysis: Option<String>,
    ) -> Result<CompanyRecord> {
        let record = CompanyRecord {
            details,
            analysis,
            saved_on: Utc::now(),
        };
        let mut next = self.companies.clone();
        next.insert(normalize_company(name), record.clone());
        write_json(&self.dir.join(COMPANIES_FILE), &next)?;
        self.companies = next;
        debug!(company = name, "company record saved");
        Ok(record)
    }

    // --- Blacklist ---

    pub fn is_blacklisted(&self, company: &str) -> bool {
        let company = normalize_company(company);
        self.blacklist.iter().any(|entry| *entry == company)
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    /// Adds or removes a company. Returns true if it is now blacklisted.
    pub fn toggle_blacklist(&mut self, company: &str) -> Result<bool> {
        let company = normalize_company(company);
        let mut next = self.blacklist.clone();
        let now_blacklisted = if next.contains(&company) {
            next.retain(|entry| *entry != company);
            false
        } else {
            next.push(company.clone());
            true
        };

        write_json(&self.dir.join(BLACKLIST_FILE), &next)?;
        self.blacklist = next;
        if now_blacklisted {
            info!("Added {} to blacklist.", company);
        } else {
            info!("Removed {} from blacklist.", company);
        }
        Ok(now_blacklisted)
    }

    // --- Presets ---

    pub fn presets(&self) -> &BTreeMap<String, Vec<String>> {
        &self.presets
    }

    pub fn preset(&self, name: &str) -> Result<&[String]> {
        self.presets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::unknown_preset(name, self.presets.keys()))
    }

    /// Creates or replaces a preset.
    pub fn save_preset(&mut self, name: &str, urls: Vec<String>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidPreset("name must not be empty".to_string()));
        }
        let urls: Vec<String> = urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(Error::InvalidPreset(format!("'{}' has no URLs", name)));
        }

        let mut next = self.presets.clone();
        next.insert(name.to_string(), urls);
        self.commit_presets(next)
    }

    pub fn delete_preset(&mut self, name: &str) -> Result<()> {
        let mut next = self.presets.clone();
        if next.remove(name).is_none() {
            return Err(Error::unknown_preset(name, self.presets.keys()));
        }
        self.commit_presets(next)
    }

    // --- Run exclusion ---

    /// Takes the single-run lock for this data directory.
    ///
    /// The lock is an exclusive OS lock on `run.lock`, so it is released when
    /// the holding process exits, however it exits. A lock file left behind by
    /// a dead process is simply locked again.
    pub fn lock_run(&self) -> Result<RunLock> {
        let path = self.dir.join(LOCK_FILE);
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io("open", &path, e))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(Error::RunInProgress(path)),
            Err(TryLockError::Error(e)) => return Err(Error::io("lock", path, e)),
        }

        // The pid is for inspection; exclusion comes from the OS lock.
        if let Err(e) = file.set_len(0).and_then(|_| writeln!(file, "{}", std::process::id())) {
            warn!("failed to record pid in {}: {}", path.display(), e);
        }
        debug!("run lock taken at {}", path.display());
        Ok(RunLock { _file: file })
    }

    fn commit_internships(&mut self, next: Vec<Internship>) -> Result<()> {
        write_json(&self.dir.join(INTERNSHIPS_FILE), &next)?;
        self.internships = next;
        Ok(())
    }

    fn commit_presets(&mut self, next: BTreeMap<String, Vec<String>>) -> Result<()> {
        write_json(&self.dir.join(PRESETS_FILE), &next)?;
        self.presets = next;
        Ok(())
    }
}

/// Held for the duration of a run. Dropping it closes the file, which releases the lock.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|source| Error::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::io("read", path, e)),
    }
}

/// Writes the whole snapshot to a sibling temp file, then renames it into place.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| Error::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| Error::io("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io("replace", path, e))?;
    Ok(())
}
