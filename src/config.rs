use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ai::parse_keys;
use crate::plugins::{INTERNSHALA_DEFAULT_URL, NAUKRI_DEFAULT_URL};
use crate::store::Store;

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub gemini_api_keys: Vec<String>,
    pub gemini_model: String,
    pub internshala_url: String,
    pub naukri_url: String,
    /// Pause between listings within a run.
    pub listing_delay: Duration,
    /// Pause before every AI request.
    pub ai_delay: Duration,
    pub browser_timeout: Duration,
    pub headless: bool,
    pub resume_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let keys = var("GEMINI_API_KEYS")
            .or_else(|| var("GEMINI_API_KEY"))
            .map(|raw| parse_keys(&raw))
            .unwrap_or_default();

        Ok(Self {
            data_dir: var("HUNT_DATA_DIR").map(PathBuf::from).unwrap_or_else(Store::default_dir),
            gemini_api_keys: keys,
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| "gemini-flash-latest".to_string()),
            internshala_url: var("INTERNSHALA_URL").unwrap_or_else(|| INTERNSHALA_DEFAULT_URL.to_string()),
            naukri_url: var("NAUKRI_URL").unwrap_or_else(|| NAUKRI_DEFAULT_URL.to_string()),
            listing_delay: Duration::from_millis(parse_or(var("HUNT_LISTING_DELAY_MS"), "HUNT_LISTING_DELAY_MS", 1000)?),
            ai_delay: Duration::from_millis(parse_or(var("HUNT_AI_DELAY_MS"), "HUNT_AI_DELAY_MS", 4000)?),
            browser_timeout: Duration::from_secs(parse_or(
                var("HUNT_BROWSER_TIMEOUT_SECS"),
                "HUNT_BROWSER_TIMEOUT_SECS",
                10,
            )?),
            headless: parse_bool(var("HUNT_HEADLESS"), "HUNT_HEADLESS", true)?,
            resume_path: var("HUNT_RESUME").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{} must be true or false, got '{}'", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.gemini_api_keys.is_empty());
        assert_eq!(config.gemini_model, "gemini-flash-latest");
        assert_eq!(config.naukri_url, NAUKRI_DEFAULT_URL);
        assert_eq!(config.listing_delay, Duration::from_secs(1));
        assert_eq!(config.ai_delay, Duration::from_secs(4));
        assert_eq!(config.browser_timeout, Duration::from_secs(10));
        assert!(config.headless);
        assert!(config.resume_path.is_none());
    }

    #[test]
    fn test_keys_fall_back_to_single_key() {
        let config = load(&[("GEMINI_API_KEY", "solo")]).unwrap();
        assert_eq!(config.gemini_api_keys, vec!["solo"]);

        let config = load(&[("GEMINI_API_KEYS", "a,b; c"), ("GEMINI_API_KEY", "solo")]).unwrap();
        assert_eq!(config.gemini_api_keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HUNT_DATA_DIR", "/tmp/hunt"),
            ("HUNT_LISTING_DELAY_MS", "0"),
            ("HUNT_HEADLESS", "false"),
            ("HUNT_RESUME", "resume.txt"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/hunt"));
        assert_eq!(config.listing_delay, Duration::ZERO);
        assert!(!config.headless);
        assert_eq!(config.resume_path, Some(PathBuf::from("resume.txt")));
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = load(&[("HUNT_AI_DELAY_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("HUNT_AI_DELAY_MS"));
        assert!(load(&[("HUNT_HEADLESS", "maybe")]).is_err());
    }
}
