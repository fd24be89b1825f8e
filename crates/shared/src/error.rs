use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes a handler can end in. Every class still produces a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Transport,
    Unauthorized,
    Validation,
    Formatting,
    Internal,
}

/// Handler failure carrying the message shown to the user.
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct BotError {
    pub code: ErrorCode,
    pub message: String,
}

impl BotError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn formatting(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Formatting, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}
