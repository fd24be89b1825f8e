pub mod error;
mod http;
mod token_manager;

#[cfg(test)]
#[path = "tests/mock_backend.rs"]
mod mock_backend;

pub use error::{AuthError, BackendError};
pub use http::{BackendApi, Endpoints, HttpBackend, TokenPair, DEFAULT_REPORTS_URL, DEFAULT_USERS_URL};
pub use token_manager::{is_expired, is_expired_at, AuthHeader, TokenManager};
