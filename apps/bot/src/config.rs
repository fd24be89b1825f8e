use std::{fs, path::Path, path::PathBuf, time::Duration};

use backend_client::{DEFAULT_REPORTS_URL, DEFAULT_USERS_URL};
use report_formatter::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use storage::{DEFAULT_CONFIG_PATH, DEFAULT_SESSIONS_PATH};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "bot.toml";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Environment variables and the settings key each one overrides. Later entries win.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("BOT_TOKEN", "bot_token"),
    ("APP__BOT_TOKEN", "bot_token"),
    ("GEMINI_API_KEY", "gemini_api_key"),
    ("APP__GEMINI_API_KEY", "gemini_api_key"),
    ("APP__BACKEND_URL", "backend_url"),
    ("APP__REPORTS_URL", "reports_url"),
    ("APP__SESSIONS_PATH", "sessions_path"),
    ("APP__CONFIG_PATH", "config_path"),
    ("APP__GEMINI_MODEL", "gemini_model"),
    ("APP__GEMINI_BASE_URL", "gemini_base_url"),
    ("APP__TELEGRAM_API_URL", "telegram_api_url"),
    ("APP__HTTP_TIMEOUT_SECONDS", "http_timeout_seconds"),
    ("APP__POLL_TIMEOUT_SECONDS", "poll_timeout_seconds"),
    ("APP__ECHO_REPORT_JSON", "echo_report_json"),
];

#[derive(Clone, PartialEq)]
pub struct Settings {
    pub bot_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub telegram_api_url: String,
    /// Users API base; the auth routes hang off it.
    pub backend_url: String,
    pub reports_url: String,
    pub sessions_path: PathBuf,
    /// Language config file.
    pub config_path: PathBuf,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub http_timeout_seconds: u64,
    pub poll_timeout_seconds: u64,
    pub echo_report_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: None,
            gemini_api_key: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.into(),
            backend_url: DEFAULT_USERS_URL.into(),
            reports_url: DEFAULT_REPORTS_URL.into(),
            sessions_path: DEFAULT_SESSIONS_PATH.into(),
            config_path: DEFAULT_CONFIG_PATH.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            http_timeout_seconds: 10,
            poll_timeout_seconds: 30,
            echo_report_json: false,
        }
    }
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    fn apply(&mut self, key: &str, value: String) {
        match key {
            "bot_token" => self.bot_token = Some(value).filter(|v| !v.trim().is_empty()),
            "gemini_api_key" => {
                self.gemini_api_key = Some(value).filter(|v| !v.trim().is_empty())
            }
            "telegram_api_url" => self.telegram_api_url = value,
            "backend_url" => self.backend_url = value,
            "reports_url" => self.reports_url = value,
            "sessions_path" => self.sessions_path = value.into(),
            "config_path" => self.config_path = value.into(),
            "gemini_model" => self.gemini_model = value,
            "gemini_base_url" => self.gemini_base_url = value,
            "http_timeout_seconds" => match value.trim().parse() {
                Ok(parsed) => self.http_timeout_seconds = parsed,
                Err(_) => warn!(key, value = %value, "ignoring invalid number"),
            },
            "poll_timeout_seconds" => match value.trim().parse() {
                Ok(parsed) => self.poll_timeout_seconds = parsed,
                Err(_) => warn!(key, value = %value, "ignoring invalid number"),
            },
            "echo_report_json" => match parse_flag(&value) {
                Some(flag) => self.echo_report_json = flag,
                None => warn!(key, value = %value, "ignoring invalid flag"),
            },
            other => warn!(key = other, "ignoring unknown settings key"),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn load_settings(settings_file: &Path) -> Settings {
    load_settings_with(settings_file, |name| std::env::var(name).ok())
}

/// Defaults, then the flat toml table at `settings_file` if present, then `env`.
pub fn load_settings_with(
    settings_file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(settings_file) {
        match toml::from_str::<toml::Table>(&raw) {
            Ok(table) => {
                for (key, value) in &table {
                    match scalar_to_string(value) {
                        Some(value) => settings.apply(key, value),
                        None => warn!(key = %key, "ignoring non-scalar settings value"),
                    }
                }
            }
            Err(err) => {
                warn!(path = %settings_file.display(), %err, "ignoring unparseable settings file")
            }
        }
    }

    for (name, key) in ENV_OVERRIDES {
        if let Some(value) = env(name) {
            settings.apply(key, value);
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
