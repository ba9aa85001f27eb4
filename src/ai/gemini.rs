use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AiError, GenerateRequest, GenerativeBackend};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

/// Google Gemini `generateContent` over the REST API.
#[derive(Debug)]
pub struct GeminiBackend {
    model_id: String,
    client: Client,
}

impl GeminiBackend {
    pub fn new(model_id: impl Into<String>, timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            model_id: model_id.into(),
            client,
        })
    }
}

impl GenerativeBackend for GeminiBackend {
    fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<String, AiError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: request.response_schema.as_ref().map(|schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            }),
            tools: if request.grounded {
                vec![serde_json::json!({ "google_search": {} })]
            } else {
                Vec::new()
            },
        };

        let response = self
            .client
            .post(format!("{}/{}:generateContent", GEMINI_API_URL, self.model_id))
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(classify_status(status, error_text));
        }

        let api_response: GeminiResponse = response
            .json()
            .map_err(|e| AiError::Parse(format!("failed to parse Gemini response: {}", e)))?;

        collect_text(api_response).ok_or(AiError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

fn classify_status(status: StatusCode, body: String) -> AiError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        AiError::RateLimited
    } else if status.is_server_error() {
        AiError::Unavailable(status.as_u16())
    } else {
        AiError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// Joins the text parts of the first candidate.
fn collect_text(response: GeminiResponse) -> Option<String> {
    let parts = response.candidates.into_iter().next()?.content?.parts;
    let text = parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join(" ");
    if text.trim().is_empty() { None } else { Some(text) }
}
