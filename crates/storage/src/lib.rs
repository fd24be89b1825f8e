use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::warn;

use shared::domain::{Language, Session, UserId};

pub const DEFAULT_SESSIONS_PATH: &str = "sessions.json";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// File-backed table of user id -> session.
///
/// The whole table is loaded once and rewritten on every [`SessionStore::save`];
/// concurrent writers are not coordinated, the last save wins.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
    sessions: BTreeMap<String, Session>,
}

impl SessionStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the table at `path`, starting empty when the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sessions = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).with_context(|| {
                format!("failed to parse sessions file '{}'", path.display())
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read sessions file '{}'", path.display())
                })
            }
        };

        Ok(Self {
            path: Some(path),
            sessions,
        })
    }

    pub fn get(&self, user_id: UserId) -> Option<&Session> {
        self.sessions.get(&user_id.to_string())
    }

    pub fn insert(&mut self, user_id: UserId, session: Session) {
        self.sessions.insert(user_id.to_string(), session);
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<Session> {
        self.sessions.remove(&user_id.to_string())
    }

    /// Swaps in a refreshed access token. Returns false when no session exists.
    pub fn replace_access(&mut self, user_id: UserId, access: impl Into<String>) -> bool {
        match self.sessions.get_mut(&user_id.to_string()) {
            Some(session) => {
                session.access = access.into();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Session)> {
        self.sessions.iter().map(|(key, session)| (key.as_str(), session))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Rewrites the whole file. In-memory stores are a no-op.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(&self.sessions)?;
        write_file(path, raw).await
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LanguageFile {
    #[serde(default)]
    language: Option<String>,
}

/// The persisted `language` key used to pick the transcription locale.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    path: PathBuf,
}

impl LanguageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current language; english when the file or key is absent or unreadable.
    pub async fn language(&self) -> Language {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), %err, "failed to read language config");
                }
                return Language::default();
            }
        };

        let file: LanguageFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "invalid language config");
                return Language::default();
            }
        };

        match file.language.as_deref().map(str::parse::<Language>) {
            Some(Ok(language)) => language,
            Some(Err(err)) => {
                warn!(path = %self.path.display(), %err, "unsupported language in config");
                Language::default()
            }
            None => Language::default(),
        }
    }

    pub async fn set_language(&self, language: Language) -> Result<()> {
        let raw = serde_json::to_string(&LanguageFile {
            language: Some(language.as_str().to_string()),
        })?;
        write_file(&self.path, raw).await
    }
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("failed to create parent directory '{}'", parent.display())
        })?;
    }

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
