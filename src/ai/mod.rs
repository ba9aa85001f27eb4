mod gemini;
mod prompts;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{ExtractedDetails, MatchAnalysis, Verdict};
use crate::retry::RetryPolicy;

pub use gemini::GeminiBackend;

// --- Backend trait ---

#[derive(Debug, Error)]
pub enum AiError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("service unavailable (HTTP {0})")]
    Unavailable(u16),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Parse(String),
    #[error("model returned no content")]
    Empty,
}

impl AiError {
    fn is_transient(&self) -> bool {
        matches!(self, AiError::RateLimited | AiError::Unavailable(_))
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    /// When set, the model must answer with JSON matching this schema.
    pub response_schema: Option<Value>,
    /// Lets the model run a web search before answering.
    pub grounded: bool,
}

/// A generative model reachable with an API key.
pub trait GenerativeBackend: Send + Sync {
    fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, AiError>;
    fn model_name(&self) -> &str;
}

// --- Result types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub details: ExtractedDetails,
    #[serde(rename = "match")]
    pub match_analysis: MatchAnalysis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredResume {
    pub full_name: String,
    pub contact: ResumeContact,
    pub summary: String,
    pub education: Vec<ResumeEducation>,
    pub experience: Vec<ResumeExperience>,
    pub projects: Vec<ResumeProject>,
    pub skills: Vec<ResumeSkillGroup>,
    pub certifications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeContact {
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub github: String,
    pub portfolio: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeEducation {
    pub institution: String,
    pub degree: String,
    pub date: String,
    pub location: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeExperience {
    pub company: String,
    pub role: String,
    pub date: String,
    pub location: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeProject {
    pub name: String,
    pub technologies: String,
    pub link: String,
    pub date: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeSkillGroup {
    pub category: String,
    pub items: String,
}

// --- Service ---

#[derive(Debug, Clone)]
pub struct AiSettings {
    /// Sleep before every outbound call, independent of retry backoff.
    pub politeness_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_secs(4),
            retry: RetryPolicy::default(),
        }
    }
}

/// Enrichment front-end over a backend, with key rotation and bounded retries.
///
/// With no keys the service is degraded: every call returns `None` and no
/// request is made. Errors never escape; they are logged and become `None`.
pub struct AiService {
    backend: Box<dyn GenerativeBackend>,
    keys: Vec<String>,
    key_index: AtomicUsize,
    settings: AiSettings,
}

impl AiService {
    pub fn new(keys: Vec<String>, backend: Box<dyn GenerativeBackend>, settings: AiSettings) -> Self {
        if keys.is_empty() {
            warn!("No Gemini API keys configured. AI enrichment is disabled.");
        } else {
            info!(keys = keys.len(), model = backend.model_name(), "AI enrichment enabled");
        }
        Self {
            backend,
            keys,
            key_index: AtomicUsize::new(0),
            settings,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of the key the next request will use.
    pub fn current_key_index(&self) -> usize {
        self.key_index.load(Ordering::SeqCst)
    }

    pub fn extract_and_match(&self, meta: &str, description: &str, resume: &str) -> Option<Extraction> {
        let request = GenerateRequest {
            prompt: prompts::extraction_prompt(meta, description, resume),
            response_schema: Some(prompts::extraction_schema()),
            grounded: false,
        };

        let mut extraction: Extraction = self.generate_json("extract-and-match", &request)?;
        extraction.match_analysis.score = extraction.match_analysis.score.min(100);
        if resume.trim().is_empty() {
            extraction.match_analysis.verdict = Verdict::NoResume;
            extraction.match_analysis.score = 0;
        }
        Some(extraction)
    }

    pub fn analyze_company(&self, name: &str, location: Option<&str>, about: Option<&str>) -> Option<String> {
        info!("Analyzing company: {}", name);
        let request = GenerateRequest {
            prompt: prompts::company_prompt(name, location, about),
            response_schema: None,
            grounded: true,
        };
        self.generate("company-analysis", &request)
    }

    pub fn tailor_resume(
        &self,
        job_description: &str,
        redacted_resume: &str,
        profile: Option<&str>,
    ) -> Option<StructuredResume> {
        let request = GenerateRequest {
            prompt: prompts::tailor_prompt(job_description, redacted_resume, profile),
            response_schema: Some(prompts::resume_schema()),
            grounded: false,
        };
        self.generate_json("tailor-resume", &request)
    }

    fn generate_json<T: DeserializeOwned>(&self, task: &str, request: &GenerateRequest) -> Option<T> {
        let text = self.generate(task, request)?;
        match serde_json::from_str(strip_code_fence(&text)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(task, "AI returned malformed JSON: {}", e);
                None
            }
        }
    }

    fn generate(&self, task: &str, request: &GenerateRequest) -> Option<String> {
        if self.is_degraded() {
            debug!(task, "AI disabled, skipping");
            return None;
        }

        thread::sleep(self.settings.politeness_delay);

        match self.generate_with_retry(request) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(task, "AI call failed: {}", e);
                None
            }
        }
    }

    fn generate_with_retry(&self, request: &GenerateRequest) -> Result<String, AiError> {
        let policy = &self.settings.retry;
        let mut attempt = 1;
        loop {
            let key = &self.keys[self.current_key_index() % self.keys.len()];
            let err = match self.backend.generate(key, request) {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            if !err.is_transient() || !policy.should_retry(attempt) {
                return Err(err);
            }

            if matches!(err, AiError::RateLimited) {
                self.rotate_key();
            }
            let delay = policy.backoff(attempt);
            warn!(attempt, "transient AI failure ({}), retrying in {:?}", err, delay);
            thread::sleep(delay);
            attempt += 1;
        }
    }

    fn rotate_key(&self) {
        let len = self.keys.len();
        let next = self
            .key_index
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .map(|previous| (previous + 1) % len)
            .unwrap_or(0);
        debug!(key_index = next, "rotated API key");
    }
}

/// Splits a delimited credential string into keys. Accepts commas, semicolons and whitespace.
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Models occasionally wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays scripted results and records every call.
    #[derive(Clone, Default)]
    pub struct ScriptedBackend {
        pub script: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
        pub calls: Arc<Mutex<Vec<(String, GenerateRequest)>>>,
        /// Returned once the script is exhausted.
        pub fallback: Arc<Mutex<Option<String>>>,
    }

    impl ScriptedBackend {
        pub fn push(&self, result: Result<String, AiError>) {
            self.script.lock().unwrap().push_back(result);
        }

        pub fn always(&self, text: &str) {
            *self.fallback.lock().unwrap() = Some(text.to_string());
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn keys_used(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }
    }

    impl GenerativeBackend for ScriptedBackend {
        fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, AiError> {
            self.calls
                .lock()
                .unwrap()
                .push((api_key.to_string(), request.clone()));
            if let Some(result) = self.script.lock().unwrap().pop_front() {
                return result;
            }
            match self.fallback.lock().unwrap().clone() {
                Some(text) => Ok(text),
                None => Err(AiError::Empty),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    pub fn fast_settings() -> AiSettings {
        AiSettings {
            politeness_delay: Duration::ZERO,
            retry: RetryPolicy::immediate(3),
        }
    }

    pub fn extraction_json(score: u32, verdict: &str) -> String {
        serde_json::json!({
            "details": {
                "description": "## Role\nBuild **Rust** services",
                "stipend": "15,000 /month",
                "company": "Acme",
                "location": "Bangalore",
                "locationType": "Hybrid",
                "duration": "6 Months",
                "ppo": true,
                "skills": ["Rust", "SQL"],
                "applyBy": "2026-11-01",
                "postedOn": "2026-10-10"
            },
            "match": {
                "score": score,
                "verdict": verdict,
                "summary": "Solid fit.",
                "pros": ["Rust"],
                "cons": []
            }
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn service(keys: &[&str], backend: &ScriptedBackend) -> AiService {
        AiService::new(
            keys.iter().map(|k| k.to_string()).collect(),
            Box::new(backend.clone()),
            fast_settings(),
        )
    }

    #[test]
    fn test_degraded_mode_returns_none_without_calls() {
        let backend = ScriptedBackend::default();
        backend.always("unused");
        let ai = service(&[], &backend);

        assert!(ai.is_degraded());
        assert!(ai.extract_and_match("meta", "desc", "resume").is_none());
        assert!(ai.analyze_company("Acme", None, None).is_none());
        assert!(ai.tailor_resume("job", "resume", None).is_none());
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_rate_limit_retries_and_rotates_key() {
        let backend = ScriptedBackend::default();
        backend.push(Err(AiError::RateLimited));
        backend.push(Err(AiError::RateLimited));
        backend.push(Ok(extraction_json(82, "Good Match")));
        let ai = service(&["key-a", "key-b"], &backend);

        let extraction = ai.extract_and_match("meta", "desc", "my resume").unwrap();
        assert_eq!(extraction.match_analysis.verdict, Verdict::Good);
        assert_eq!(extraction.match_analysis.score, 82);
        assert_eq!(extraction.details.skills, vec!["Rust", "SQL"]);

        assert_eq!(backend.keys_used(), vec!["key-a", "key-b", "key-a"]);
        assert_eq!(ai.current_key_index(), 0);
    }

    #[test]
    fn test_single_key_rotation_stays_in_bounds() {
        let backend = ScriptedBackend::default();
        backend.push(Err(AiError::RateLimited));
        backend.push(Ok("report".to_string()));
        let ai = service(&["only"], &backend);

        assert_eq!(ai.analyze_company("Acme", None, None).as_deref(), Some("report"));
        assert_eq!(backend.keys_used(), vec!["only", "only"]);
    }

    #[test]
    fn test_unavailable_retries_without_rotation() {
        let backend = ScriptedBackend::default();
        backend.push(Err(AiError::Unavailable(503)));
        backend.push(Ok("report".to_string()));
        let ai = service(&["key-a", "key-b"], &backend);

        assert_eq!(ai.analyze_company("Acme", None, None).as_deref(), Some("report"));
        assert_eq!(backend.keys_used(), vec!["key-a", "key-a"]);
    }

    #[test]
    fn test_retry_budget_exhausted_returns_none() {
        let backend = ScriptedBackend::default();
        for _ in 0..5 {
            backend.push(Err(AiError::Unavailable(500)));
        }
        let ai = service(&["key-a"], &backend);

        assert!(ai.analyze_company("Acme", None, None).is_none());
        assert_eq!(backend.call_count(), 3);
    }

    #[test]
    fn test_non_transient_error_is_not_retried() {
        let backend = ScriptedBackend::default();
        backend.push(Err(AiError::Rejected {
            status: 400,
            body: "bad".to_string(),
        }));
        backend.push(Ok("never reached".to_string()));
        let ai = service(&["key-a"], &backend);

        assert!(ai.analyze_company("Acme", None, None).is_none());
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_analyze_company_is_grounded() {
        let backend = ScriptedBackend::default();
        backend.always("report");
        let ai = service(&["key-a"], &backend);
        ai.analyze_company("Acme", Some("Pune"), Some("Anvils")).unwrap();

        let calls = backend.calls.lock().unwrap();
        let (_, request) = &calls[0];
        assert!(request.grounded);
        assert!(request.response_schema.is_none());
        assert!(request.prompt.contains("Company: Acme"));
    }

    #[test]
    fn test_extract_without_resume_forces_no_resume_verdict() {
        let backend = ScriptedBackend::default();
        backend.push(Ok(extraction_json(55, "Average Match")));
        let ai = service(&["key-a"], &backend);

        let extraction = ai.extract_and_match("meta", "desc", "").unwrap();
        assert_eq!(extraction.match_analysis.verdict, Verdict::NoResume);
        assert_eq!(extraction.match_analysis.score, 0);
    }

    #[test]
    fn test_malformed_json_becomes_none() {
        let backend = ScriptedBackend::default();
        backend.push(Ok("not json".to_string()));
        let ai = service(&["key-a"], &backend);
        assert!(ai.extract_and_match("meta", "desc", "resume").is_none());
    }

    #[test]
    fn test_score_is_clamped() {
        let backend = ScriptedBackend::default();
        backend.push(Ok(format!("```json\n{}\n```", extraction_json(140, "Good Match"))));
        let ai = service(&["key-a"], &backend);
        let extraction = ai.extract_and_match("meta", "desc", "resume").unwrap();
        assert_eq!(extraction.match_analysis.score, 100);
    }

    #[test]
    fn test_tailor_resume_parses_structured_output() {
        let backend = ScriptedBackend::default();
        backend.push(Ok(serde_json::json!({
            "fullName": "A. Student",
            "contact": { "email": "a@example.com" },
            "summary": "Rust developer",
            "education": [],
            "experience": [{ "company": "Acme", "role": "Intern", "date": "2025" }],
            "skills": [{ "category": "Languages", "items": "Rust, Go" }]
        })
        .to_string()));
        let ai = service(&["key-a"], &backend);

        let resume = ai.tailor_resume("job", "resume", Some("github.com/a")).unwrap();
        assert_eq!(resume.full_name, "A. Student");
        assert_eq!(resume.contact.email, "a@example.com");
        assert_eq!(resume.experience[0].role, "Intern");
        assert!(resume.projects.is_empty());
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_keys("a, b;c\n d"), vec!["a", "b", "c", "d"]);
        assert!(parse_keys("  ,, ").is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence(" {} "), "{}");
    }
}
