use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ChatId);

/// Maximum description length requested from the language model.
pub const DESCRIPTION_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Hindi,
    Hinglish,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hindi, Language::Hinglish];

    /// Locale hint handed to the transcriber.
    pub fn locale_code(self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Hindi => "hi-IN",
            Language::Hinglish => "en-IN",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Hindi => "hindi",
            Language::Hinglish => "hinglish",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| format!("unsupported language '{raw}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// Case-insensitive. Unrecognised labels become `Medium`.
impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            other => {
                warn!(severity = other, "unknown severity, using medium");
                Severity::default()
            }
        }
    }
}

/// Structured accessibility-issue record sent to `POST /reports/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub problem_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub disability_types: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default = "default_status", deserialize_with = "status_or_default")]
    pub status: String,
}

pub const DEFAULT_REPORT_STATUS: &str = "Active";

fn default_status() -> String {
    DEFAULT_REPORT_STATUS.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn status_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|status| !status.trim().is_empty())
        .unwrap_or_else(default_status))
}

impl Report {
    pub fn locate(&mut self, latitude: f64, longitude: f64) {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
    }
}

/// Stored credentials for one chat user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access: String,
    pub refresh: String,
    pub login_time: DateTime<Utc>,
}

/// Body of `POST /auth/register/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub needs_wheelchair_access: bool,
    pub needs_tactile_paths: bool,
    pub needs_audio_guidance: bool,
    pub phone_number: String,
    pub disability_type: String,
}

/// Username the backend account is created with: the email's local part.
pub fn username_from_email(email: &str) -> &str {
    email.split('@').next().unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
