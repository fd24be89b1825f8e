//! Voice and text report flows.

use backend_client::{AuthHeader, BackendError};
use shared::{
    domain::{Report, UserId},
    error::BotError,
    protocol::{Keyboard, Reply},
};
use tracing::{debug, error, info, warn};

use crate::controller::{Controller, UserState, LOCATION_BUTTON};

const ERROR_BODY_MAX_CHARS: usize = 200;
const NOT_UNDERSTOOD: &str = "Couldn't understand you. Try again.";
const LOGIN_FIRST: &str = "Please /login first.";

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// User-facing outcome of a report submission.
pub fn submission_reply(result: &Result<(), BackendError>) -> Reply {
    let reply = match result {
        Ok(()) => Reply::plain("Report successfully submitted!"),
        Err(err) if err.is_transport() => {
            Reply::plain("Couldn't send report. Please try again later.")
        }
        Err(err) => {
            let body = err.body_text();
            let body = truncate_chars(&body, ERROR_BODY_MAX_CHARS);
            match err.status() {
                Some(status) => Reply::plain(format!("Failed (status {status}): {body}")),
                None => Reply::plain(format!("Failed: {body}")),
            }
        }
    };
    reply.with_keyboard(Keyboard::Remove)
}

fn echo_reply(report: &Report) -> Option<Reply> {
    match serde_json::to_string_pretty(report) {
        Ok(json) => Some(Reply::markdown(format!("Sent JSON:\n```\n{json}\n```"))),
        Err(err) => {
            warn!(error = %err, "failed to render report echo");
            None
        }
    }
}

impl Controller {
    /// Transcribes a voice note and keeps the formatted report until a location arrives.
    pub(crate) async fn start_voice_report(
        &self,
        user_id: UserId,
        state: &mut UserState,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<Vec<Reply>, BotError> {
        let language = self.services.language.language().await;
        let transcript = match self
            .services
            .transcriber
            .transcribe(audio, mime_type, language)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                info!(%user_id, %language, "empty transcript");
                return Err(BotError::formatting(NOT_UNDERSTOOD));
            }
            Err(err) => {
                error!(%user_id, %language, error = %err, "transcription failed");
                return Err(BotError::formatting(NOT_UNDERSTOOD));
            }
        };
        debug!(%user_id, %transcript, "voice transcribed");

        let report = self
            .services
            .formatter
            .format_deferred(&transcript)
            .await
            .ok_or_else(|| BotError::formatting("Couldn't format your report. Please try again."))?;

        info!(%user_id, problem_type = %report.problem_type, "voice report drafted");
        let summary = format!(
            "Got it: {} ({:?} severity).\nPlease share your location to complete the report.",
            report.problem_type, report.severity
        );
        state.pending_report = Some(report);

        Ok(vec![Reply::plain(summary).with_keyboard(Keyboard::RequestLocation {
            label: LOCATION_BUTTON.to_string(),
        })])
    }

    /// Attaches the shared location to the pending report and submits it.
    ///
    /// Without a session the report stays pending so the user can log in and resend
    /// the location. Once a submission is attempted the slot is cleared whatever the outcome.
    pub(crate) async fn complete_voice_report(
        &self,
        user_id: UserId,
        state: &mut UserState,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<Reply>, BotError> {
        let Some(report) = state.pending_report.as_mut() else {
            return Err(BotError::internal("No pending report."));
        };
        report.locate(latitude, longitude);

        let Some(auth) = self.services.tokens.auth_header(user_id).await else {
            return Err(BotError::unauthorized(LOGIN_FIRST));
        };

        let Some(report) = state.pending_report.take() else {
            return Err(BotError::internal("No pending report."));
        };
        Ok(self.submit(user_id, &auth, &report).await)
    }

    /// `/submitreport <text>`: formats free text at the saved location, or 0,0 when none.
    pub(crate) async fn submit_text_report(
        &self,
        user_id: UserId,
        state: &UserState,
        text: &str,
    ) -> Result<Vec<Reply>, BotError> {
        let (latitude, longitude) = state
            .last_location
            .map(|loc| (loc.latitude, loc.longitude))
            .unwrap_or((0.0, 0.0));

        let report = self
            .services
            .formatter
            .format(text, latitude, longitude)
            .await
            .ok_or_else(|| BotError::formatting("Couldn't process your report. Please try again."))?;

        let Some(auth) = self.services.tokens.auth_header(user_id).await else {
            return Err(BotError::unauthorized("You are not logged in. Please /login first."));
        };

        Ok(self.submit(user_id, &auth, &report).await)
    }

    async fn submit(&self, user_id: UserId, auth: &AuthHeader, report: &Report) -> Vec<Reply> {
        let result = self.services.backend.submit_report(auth, report).await;
        match &result {
            Ok(()) => info!(%user_id, problem_type = %report.problem_type, "report submitted"),
            Err(err) => warn!(%user_id, status = ?err.status(), error = %err, "report rejected"),
        }

        let mut replies = vec![submission_reply(&result)];
        if self.services.echo_report_json {
            replies.extend(echo_reply(report));
        }
        replies
    }
}

#[cfg(test)]
#[path = "tests/reports_tests.rs"]
mod tests;
