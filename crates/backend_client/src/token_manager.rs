use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use shared::domain::{Session, UserId};
use storage::SessionStore;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::{AuthError, BackendError},
    http::BackendApi,
};

/// Bearer credential for one authorized backend call.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    access_token: String,
}

impl AuthHeader {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Value of the `Authorization` header.
    pub fn value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthHeader(Bearer <redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<f64>,
}

/// True unless `token` decodes to claims whose `exp` is not before now.
///
/// The signature is not checked; the backend stays the authority on validity.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = match decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims,
        Err(_) => return true,
    };

    let now = now.timestamp_millis() as f64 / 1000.0;
    match claims.exp {
        Some(exp) => exp < now,
        None => true,
    }
}

/// Owns the session table and hands out auth headers, refreshing lazily.
pub struct TokenManager {
    backend: Arc<dyn BackendApi>,
    store: Mutex<SessionStore>,
}

impl TokenManager {
    pub fn new(backend: Arc<dyn BackendApi>, store: SessionStore) -> Self {
        Self {
            backend,
            store: Mutex::new(store),
        }
    }

    pub async fn session(&self, user_id: UserId) -> Option<Session> {
        self.store.lock().await.get(user_id).cloned()
    }

    pub async fn login(
        &self,
        user_id: UserId,
        username: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let tokens = match self.backend.login(username, password).await {
            Ok(tokens) => tokens,
            Err(BackendError::Unauthorized(_)) => {
                info!(%user_id, "login rejected: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) if err.is_transport() => {
                error!(%user_id, error = %err, "login request failed");
                return Err(AuthError::Connection);
            }
            Err(err) => {
                warn!(%user_id, error = %err, "login failed");
                return Err(AuthError::Rejected(err.body_text()));
            }
        };

        let mut store = self.store.lock().await;
        store.insert(
            user_id,
            Session {
                access: tokens.access,
                refresh: tokens.refresh,
                login_time: Utc::now(),
            },
        );
        if let Err(err) = store.save().await {
            error!(%user_id, error = %err, "failed to persist sessions after login");
        }
        info!(%user_id, "login succeeded");
        Ok("Login successful!".to_string())
    }

    pub async fn logout(&self, user_id: UserId) -> bool {
        let mut store = self.store.lock().await;
        if store.remove(user_id).is_none() {
            return false;
        }
        if let Err(err) = store.save().await {
            error!(%user_id, error = %err, "failed to persist sessions after logout");
        }
        info!(%user_id, "logged out");
        true
    }

    /// Mints a new access token from the stored refresh token.
    pub async fn refresh(&self, user_id: UserId) -> Result<String, AuthError> {
        let refresh_token = self
            .store
            .lock()
            .await
            .get(user_id)
            .map(|session| session.refresh.clone())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NoRefreshToken)?;

        let access = match self.backend.refresh(&refresh_token).await {
            Ok(access) => access,
            Err(err) if err.is_transport() => {
                error!(%user_id, error = %err, "token refresh request failed");
                return Err(AuthError::Connection);
            }
            Err(err) => {
                warn!(%user_id, error = %err, "token refresh rejected");
                return Err(AuthError::RefreshRejected(err.body_text()));
            }
        };

        let mut store = self.store.lock().await;
        if !store.replace_access(user_id, access.clone()) {
            // Logged out while the refresh was in flight.
            return Err(AuthError::NoRefreshToken);
        }
        if let Err(err) = store.save().await {
            error!(%user_id, error = %err, "failed to persist sessions after refresh");
        }
        Ok(access)
    }

    /// `None` when the user has no session or the refresh fails.
    pub async fn auth_header(&self, user_id: UserId) -> Option<AuthHeader> {
        let access = self.store.lock().await.get(user_id)?.access.clone();
        if !is_expired(&access) {
            return Some(AuthHeader::bearer(access));
        }

        match self.refresh(user_id).await {
            Ok(access) => Some(AuthHeader::bearer(access)),
            Err(err) => {
                warn!(%user_id, error = %err, "could not refresh expired access token");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/token_manager_tests.rs"]
mod tests;
