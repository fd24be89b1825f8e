//! Per-user conversation handling: commands, registration and report flows.

mod controller;
pub mod registration;
mod reports;

pub use controller::{Controller, Location, Services, UserState};
pub use reports::submission_reply;

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;
