use shared::error::BotError;
use thiserror::Error;

/// Outcome of a backend call that did not succeed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation failed: {0}")]
    Validation(serde_json::Value),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl BackendError {
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status {
            reqwest::StatusCode::BAD_REQUEST => BackendError::Validation(
                serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)),
            ),
            reqwest::StatusCode::UNAUTHORIZED => BackendError::Unauthorized(body),
            _ => BackendError::Status {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// HTTP status of a rejected call, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Validation(_) => Some(400),
            BackendError::Unauthorized(_) => Some(401),
            BackendError::Status { status, .. } => Some(*status),
            BackendError::Transport(_) | BackendError::Decode(_) => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }

    /// Raw backend text, as relayed to the user.
    pub fn body_text(&self) -> String {
        match self {
            BackendError::Transport(message) | BackendError::Decode(message) => message.clone(),
            BackendError::Unauthorized(body) | BackendError::Status { body, .. } => body.clone(),
            BackendError::Validation(errors) => errors.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Token lifecycle failure. `Display` is the message shown in chat.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials,
    #[error("Login failed: {0}")]
    Rejected(String),
    #[error("Server connection error. Please try again later.")]
    Connection,
    #[error("No refresh token found. Please /login again.")]
    NoRefreshToken,
    #[error("Refresh failed: {0}")]
    RefreshRejected(String),
}

impl From<AuthError> for BotError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Connection => BotError::transport(err.to_string()),
            _ => BotError::unauthorized(err.to_string()),
        }
    }
}
