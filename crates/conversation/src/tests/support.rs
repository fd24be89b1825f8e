//! In-process fakes for the backend and the model services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backend_client::{AuthHeader, BackendApi, BackendError, TokenManager, TokenPair};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use report_formatter::{GenerativeModel, ModelError, ReportFormatter, Transcriber};
use serde::Serialize;
use shared::{
    domain::{Language, RegistrationPayload, Report, UserId},
    protocol::{Inbound, Reply},
};
use storage::{LanguageConfig, SessionStore};
use tempfile::TempDir;

use crate::{Controller, Services};

pub const PASSWORD: &str = "correct-horse";
pub const REFRESH: &str = "refresh-1";

pub const REPORT_JSON: &str = r#"{
  "problem_type": "Blocked Ramp",
  "disability_types": ["Wheelchair"],
  "severity": "High",
  "description": "Ramp at the station entrance is blocked by parked scooters."
}"#;

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: i64,
}

pub fn mint_token(offset_seconds: i64) -> String {
    encode(
        &Header::default(),
        &Claims {
            sub: "user:7".to_string(),
            exp: Utc::now().timestamp() + offset_seconds,
        },
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("mint token")
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accept,
    Reject { status: u16, body: String },
    Offline,
}

pub struct FakeBackend {
    pub submit_outcome: Mutex<SubmitOutcome>,
    pub access_offset: Mutex<i64>,
    pub registrations: Mutex<Vec<RegistrationPayload>>,
    pub reports: Mutex<Vec<(String, Report)>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            submit_outcome: Mutex::new(SubmitOutcome::Accept),
            access_offset: Mutex::new(3600),
            registrations: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn submitted(&self) -> Vec<(String, Report)> {
        self.reports.lock().expect("reports").clone()
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn register(&self, payload: &RegistrationPayload) -> Result<(), BackendError> {
        if payload.email.contains("taken") {
            return Err(BackendError::Validation(
                serde_json::json!({ "email": ["already registered"] }),
            ));
        }
        self.registrations
            .lock()
            .expect("registrations")
            .push(payload.clone());
        Ok(())
    }

    async fn login(&self, _username: &str, password: &str) -> Result<TokenPair, BackendError> {
        if password != PASSWORD {
            return Err(BackendError::Unauthorized("no active account".into()));
        }
        let offset = *self.access_offset.lock().expect("offset");
        Ok(TokenPair {
            access: mint_token(offset),
            refresh: REFRESH.to_string(),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, BackendError> {
        if refresh_token != REFRESH {
            return Err(BackendError::Unauthorized("token not valid".into()));
        }
        Ok(mint_token(3600))
    }

    async fn submit_report(&self, auth: &AuthHeader, report: &Report) -> Result<(), BackendError> {
        let outcome = self.submit_outcome.lock().expect("outcome").clone();
        match outcome {
            SubmitOutcome::Offline => Err(BackendError::Transport("connection refused".into())),
            SubmitOutcome::Reject { status, body } => {
                self.reports
                    .lock()
                    .expect("reports")
                    .push((auth.value(), report.clone()));
                Err(BackendError::Status { status, body })
            }
            SubmitOutcome::Accept => {
                self.reports
                    .lock()
                    .expect("reports")
                    .push((auth.value(), report.clone()));
                Ok(())
            }
        }
    }
}

pub struct FakeModel {
    pub response: Mutex<Result<String, String>>,
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        self.response
            .lock()
            .expect("response")
            .clone()
            .map_err(ModelError::Request)
    }
}

pub struct FakeTranscriber {
    pub transcript: Mutex<Result<String, String>>,
    pub languages: Mutex<Vec<Language>>,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _mime_type: &str,
        language: Language,
    ) -> Result<String, ModelError> {
        self.languages.lock().expect("languages").push(language);
        self.transcript
            .lock()
            .expect("transcript")
            .clone()
            .map_err(ModelError::Request)
    }
}

pub struct Harness {
    pub controller: Controller,
    pub backend: Arc<FakeBackend>,
    pub model: Arc<FakeModel>,
    pub transcriber: Arc<FakeTranscriber>,
    pub language: LanguageConfig,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_echo(false)
    }

    pub fn with_echo(echo_report_json: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(FakeBackend::default());
        let model = Arc::new(FakeModel {
            response: Mutex::new(Ok(REPORT_JSON.to_string())),
        });
        let transcriber = Arc::new(FakeTranscriber {
            transcript: Mutex::new(Ok(
                "the ramp at the station is blocked by scooters".to_string()
            )),
            languages: Mutex::new(Vec::new()),
        });
        let language = LanguageConfig::new(dir.path().join("config.json"));

        let services = Services {
            tokens: Arc::new(TokenManager::new(backend.clone(), SessionStore::in_memory())),
            backend: backend.clone(),
            formatter: Arc::new(ReportFormatter::new(model.clone())),
            transcriber: transcriber.clone(),
            language: language.clone(),
            echo_report_json,
        };

        Self {
            controller: Controller::new(services),
            backend,
            model,
            transcriber,
            language,
            _dir: dir,
        }
    }

    pub async fn send(&self, user: i64, text: &str) -> Vec<Reply> {
        self.controller
            .handle(UserId(user), Inbound::from_text(text))
            .await
    }

    pub async fn voice(&self, user: i64) -> Vec<Reply> {
        self.controller
            .handle(
                UserId(user),
                Inbound::Voice {
                    audio: vec![0x4f, 0x67, 0x67, 0x53],
                    mime_type: "audio/ogg".to_string(),
                },
            )
            .await
    }

    pub async fn location(&self, user: i64, latitude: f64, longitude: f64) -> Vec<Reply> {
        self.controller
            .handle(
                UserId(user),
                Inbound::Location {
                    latitude,
                    longitude,
                },
            )
            .await
    }

    pub async fn login(&self, user: i64) {
        let replies = self.send(user, &format!("/login asha {PASSWORD}")).await;
        assert_eq!(texts(&replies), ["Login successful!"]);
    }
}

pub fn texts(replies: &[Reply]) -> Vec<&str> {
    replies.iter().map(|reply| reply.text.as_str()).collect()
}
