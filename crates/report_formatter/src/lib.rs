//! Turns free-form problem descriptions into [`Report`] records with a
//! generative model, and voice notes into text with a transcriber.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{Language, Report, DESCRIPTION_MAX_CHARS};
use thiserror::Error;
use tracing::{error, info};

mod gemini;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Request(err.without_url().to_string())
    }
}

/// Single-turn prompt -> text completion.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Speech -> text, with a language hint.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
        language: Language,
    ) -> Result<String, ModelError>;
}

pub struct ReportFormatter {
    model: Arc<dyn GenerativeModel>,
}

impl ReportFormatter {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Formats a typed report, using `latitude`/`longitude` when the model leaves them out.
    pub async fn format(&self, text: &str, latitude: f64, longitude: f64) -> Option<Report> {
        let prompt = located_prompt(text, latitude, longitude);
        let mut report = self.run(&prompt).await?;
        report.latitude.get_or_insert(latitude);
        report.longitude.get_or_insert(longitude);
        Some(report)
    }

    /// Formats a spoken report; coordinates stay empty until a location is shared.
    pub async fn format_deferred(&self, text: &str) -> Option<Report> {
        let prompt = deferred_prompt(text);
        let mut report = self.run(&prompt).await?;
        report.latitude = None;
        report.longitude = None;
        Some(report)
    }

    async fn run(&self, prompt: &str) -> Option<Report> {
        let raw = match self.model.generate(prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                error!(error = %err, "report model call failed");
                return None;
            }
        };

        match parse_report(&raw) {
            Ok(report) => {
                info!(problem_type = %report.problem_type, severity = ?report.severity, "report formatted");
                Some(report)
            }
            Err(err) => {
                error!(error = %err, "model output is not a valid report");
                None
            }
        }
    }
}

/// Removes an optional ```` ```json ```` / ```` ``` ```` fence around the model output.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

pub fn parse_report(raw: &str) -> Result<Report, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

fn located_prompt(text: &str, latitude: f64, longitude: f64) -> String {
    format!(
        r#"You are a strict JSON generator for an accessibility report backend.

Convert the user's message into valid JSON with these fields:
{{
  "latitude": <float>,
  "longitude": <float>,
  "problem_type": <string>,
  "disability_types": <list of strings>,
  "severity": <"Low" | "Medium" | "High">,
  "description": <string, at most {DESCRIPTION_MAX_CHARS} characters>,
  "photo_url": <string or null>,
  "status": <string>
}}

Rules:
- Output only valid JSON, no markdown or text.
- Use the provided coordinates: latitude={latitude}, longitude={longitude}.
- Default severity "Medium", photo_url null, status "Active".

User report: "{text}""#
    )
}

fn deferred_prompt(text: &str) -> String {
    format!(
        r#"You are a JSON generator for an accessibility report backend.

The user may speak Hindi, English, or a mix of both.
Translate everything into clear English before generating the JSON.

Generate only valid JSON in this exact format:
{{
  "latitude": null,
  "longitude": null,
  "problem_type": "<brief type, like Broken Bridge or Slippery Path>",
  "disability_types": ["Wheelchair"] or ["Visual"] or ["Hearing"] or ["Other"],
  "severity": "<Low|Medium|High>",
  "description": "<problem description, at most {DESCRIPTION_MAX_CHARS} characters>",
  "photo_url": null,
  "status": "Active"
}}

Only return JSON. User text: "{text}""#
    )
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
