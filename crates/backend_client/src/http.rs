use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::domain::{RegistrationPayload, Report};
use url::Url;

use crate::{error::BackendError, token_manager::AuthHeader};

pub const DEFAULT_USERS_URL: &str = "https://saarthi-backend-xv47.onrender.com/api/users/";
pub const DEFAULT_REPORTS_URL: &str = "https://saarthi-backend-xv47.onrender.com/api/reports/";

/// Access/refresh pair returned by the login endpoint. Both are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn register(&self, payload: &RegistrationPayload) -> Result<(), BackendError>;
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, BackendError>;
    async fn refresh(&self, refresh_token: &str) -> Result<String, BackendError>;
    async fn submit_report(&self, auth: &AuthHeader, report: &Report) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub register: Url,
    pub login: Url,
    pub refresh: Url,
    pub reports: Url,
}

impl Endpoints {
    /// `users_url` is the base the `auth/*` routes hang off.
    pub fn new(users_url: &str, reports_url: &str) -> Result<Self, url::ParseError> {
        let users = with_trailing_slash(users_url)?;
        Ok(Self {
            register: users.join("auth/register/")?,
            login: users.join("auth/login/")?,
            refresh: users.join("auth/refresh/")?,
            reports: Url::parse(reports_url)?,
        })
    }
}

fn with_trailing_slash(raw: &str) -> Result<Url, url::ParseError> {
    let raw = raw.trim();
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}

/// Stateless reqwest client for the accessibility backend.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            endpoints,
        })
    }
}

async fn failure(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
    BackendError::from_status(status, body)
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn register(&self, payload: &RegistrationPayload) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.endpoints.register.clone())
            .json(payload)
            .send()
            .await?;

        if response.status() == StatusCode::CREATED {
            return Ok(());
        }
        Err(failure(response).await)
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, BackendError> {
        let response = self
            .http
            .post(self.endpoints.login.clone())
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(failure(response).await);
        }
        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.endpoints.refresh.clone())
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(failure(response).await);
        }
        let body: RefreshResponse = response.json().await?;
        Ok(body.access)
    }

    async fn submit_report(&self, auth: &AuthHeader, report: &Report) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.endpoints.reports.clone())
            .header(AUTHORIZATION, auth.value())
            .json(report)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => Err(failure(response).await),
        }
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
