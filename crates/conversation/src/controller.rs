use std::{collections::HashMap, sync::Arc};

use backend_client::{BackendApi, TokenManager};
use report_formatter::{ReportFormatter, Transcriber};
use shared::{
    domain::{Language, Report, UserId},
    error::{BotError, ErrorCode},
    protocol::{Inbound, Keyboard, Reply},
};
use storage::LanguageConfig;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::registration::{self, Output, RegistrationDraft, RegistrationState};

const HELP: &str = "I help you report accessibility problems.\n\n\
/register - create an account\n\
/login <username> <password> - sign in\n\
/logout - sign out\n\n\
Send a voice message describing the problem, then share your location.\n\
Or use /sendlocation, then /submitreport <description>.\n\n\
/language [english|hindi|hinglish] - language of your voice messages\n\
/cancel - abort a registration or a pending report";

pub(crate) const LOCATION_BUTTON: &str = "Send my location";

/// Everything a handler may call out to.
pub struct Services {
    pub tokens: Arc<TokenManager>,
    pub backend: Arc<dyn BackendApi>,
    pub formatter: Arc<ReportFormatter>,
    pub transcriber: Arc<dyn Transcriber>,
    pub language: LanguageConfig,
    /// Echo the submitted report JSON back to the user after each submission.
    pub echo_report_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Per-user conversation state. Guarded by one lock per user.
#[derive(Debug, Default)]
pub struct UserState {
    pub(crate) registration: Option<(RegistrationState, RegistrationDraft)>,
    pub(crate) pending_report: Option<Report>,
    pub(crate) last_location: Option<Location>,
}

impl UserState {
    /// Nothing worth remembering between messages.
    fn is_idle(&self) -> bool {
        self.registration.is_none() && self.pending_report.is_none() && self.last_location.is_none()
    }
}

pub struct Controller {
    pub(crate) services: Services,
    users: Mutex<HashMap<UserId, Arc<Mutex<UserState>>>>,
}

fn inbound_kind(inbound: &Inbound) -> &'static str {
    match inbound {
        Inbound::Command { .. } => "command",
        Inbound::Text(_) => "text",
        Inbound::Voice { .. } => "voice",
        Inbound::Location { .. } => "location",
    }
}

impl Controller {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            users: Mutex::new(HashMap::new()),
        }
    }

    async fn user_state(&self, user_id: UserId) -> Arc<Mutex<UserState>> {
        let mut users = self.users.lock().await;
        users.entry(user_id).or_default().clone()
    }

    async fn existing_user_state(&self, user_id: UserId) -> Option<Arc<Mutex<UserState>>> {
        self.users.lock().await.get(&user_id).cloned()
    }

    /// Drops an idle entry unless another message for the same user already holds it.
    async fn forget_if_idle(&self, user_id: UserId, user: Arc<Mutex<UserState>>) {
        let mut users = self.users.lock().await;
        // The map and `user` are the only holders; new ones need the map lock.
        if Arc::strong_count(&user) > 2 {
            return;
        }
        let idle = user.try_lock().map(|state| state.is_idle()).unwrap_or(false);
        if idle {
            users.remove(&user_id);
        }
    }

    /// Handles one inbound message. Always yields at least one reply.
    ///
    /// Messages from the same user are serialized; different users run independently.
    pub async fn handle(&self, user_id: UserId, inbound: Inbound) -> Vec<Reply> {
        info!(%user_id, kind = inbound_kind(&inbound), "inbound message");
        let user = self.user_state(user_id).await;
        let mut state = user.lock().await;
        let outcome = self.dispatch(user_id, &mut state, inbound).await;
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.forget_if_idle(user_id, user).await;
        }

        match outcome {
            Ok(replies) if replies.is_empty() => vec![Reply::plain(HELP)],
            Ok(replies) => replies,
            Err(err) => {
                match err.code {
                    ErrorCode::Transport | ErrorCode::Internal => {
                        error!(%user_id, code = ?err.code, message = %err.message, "handler failed")
                    }
                    _ => warn!(%user_id, code = ?err.code, message = %err.message, "handler declined"),
                }
                vec![Reply::plain(err.message)]
            }
        }
    }

    /// Snapshot of the pending voice report, if any.
    pub async fn pending_report(&self, user_id: UserId) -> Option<Report> {
        let user = self.existing_user_state(user_id).await?;
        let state = user.lock().await;
        state.pending_report.clone()
    }

    pub async fn registration_state(&self, user_id: UserId) -> Option<RegistrationState> {
        let user = self.existing_user_state(user_id).await?;
        let state = user.lock().await;
        state.registration.as_ref().map(|(current, _)| *current)
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        state: &mut UserState,
        inbound: Inbound,
    ) -> Result<Vec<Reply>, BotError> {
        match inbound {
            Inbound::Command { name, args } => {
                self.handle_command(user_id, state, &name, &args).await
            }
            Inbound::Text(text) => match state.registration.take() {
                Some((current, draft)) => {
                    self.continue_registration(state, current, draft, &text).await
                }
                None => Ok(vec![Reply::plain(
                    "Send a voice message describing the problem, or use /submitreport <description>. \
                     Send /start for all commands.",
                )]),
            },
            Inbound::Voice { audio, mime_type } => {
                self.start_voice_report(user_id, state, &audio, &mime_type)
                    .await
            }
            Inbound::Location {
                latitude,
                longitude,
            } => {
                if state.pending_report.is_some() {
                    self.complete_voice_report(user_id, state, latitude, longitude)
                        .await
                } else {
                    state.last_location = Some(Location {
                        latitude,
                        longitude,
                    });
                    Ok(vec![Reply::plain(format!(
                        "Location saved: ({latitude:.4}, {longitude:.4})"
                    ))
                    .with_keyboard(Keyboard::Remove)])
                }
            }
        }
    }

    async fn handle_command(
        &self,
        user_id: UserId,
        state: &mut UserState,
        name: &str,
        args: &[String],
    ) -> Result<Vec<Reply>, BotError> {
        match name {
            "start" | "help" => Ok(vec![Reply::plain(format!("Welcome! {HELP}"))]),
            "register" => {
                let (first, draft, prompt) = registration::start();
                state.registration = Some((first, draft));
                Ok(vec![prompt])
            }
            "cancel" => {
                if state.registration.take().is_some() {
                    info!(%user_id, "registration canceled");
                    Ok(vec![registration::cancel_reply()])
                } else if state.pending_report.take().is_some() {
                    Ok(vec![Reply::plain("Pending report discarded.")
                        .with_keyboard(Keyboard::Remove)])
                } else {
                    Ok(vec![Reply::plain("Nothing to cancel.")])
                }
            }
            "login" => {
                let [username, password, ..] = args else {
                    return Err(BotError::validation("Usage: /login <username> <password>"));
                };
                let message = self
                    .services
                    .tokens
                    .login(user_id, username, password)
                    .await?;
                Ok(vec![Reply::plain(message)])
            }
            "logout" => {
                if self.services.tokens.logout(user_id).await {
                    Ok(vec![Reply::plain("Logged out successfully.")])
                } else {
                    Ok(vec![Reply::plain("You are not logged in.")])
                }
            }
            "sendlocation" => Ok(vec![Reply::plain("Please share your current location:")
                .with_keyboard(Keyboard::RequestLocation {
                    label: LOCATION_BUTTON.to_string(),
                })]),
            "submitreport" => {
                if args.is_empty() {
                    return Err(BotError::validation("Usage: /submitreport <your report text>"));
                }
                self.submit_text_report(user_id, state, &args.join(" "))
                    .await
            }
            "language" => self.language_command(user_id, args).await,
            other => {
                warn!(%user_id, command = other, "unknown command");
                Ok(vec![Reply::plain(
                    "Unknown command. Send /start to see what I can do.",
                )])
            }
        }
    }

    async fn continue_registration(
        &self,
        state: &mut UserState,
        current: RegistrationState,
        draft: RegistrationDraft,
        text: &str,
    ) -> Result<Vec<Reply>, BotError> {
        let transition = registration::advance(current, draft, text);
        if let Some(next) = transition.next {
            state.registration = Some((next, transition.draft));
        }

        match transition.output {
            Output::Reply(reply) => Ok(vec![reply]),
            Output::Submit(payload) => {
                let result = self.services.backend.register(&payload).await;
                match &result {
                    Ok(()) => info!(username = %payload.username, "registration submitted"),
                    Err(err) => warn!(username = %payload.username, error = %err, "registration failed"),
                }
                Ok(vec![registration::submission_reply(&payload, result)])
            }
        }
    }

    async fn language_command(
        &self,
        user_id: UserId,
        args: &[String],
    ) -> Result<Vec<Reply>, BotError> {
        let Some(requested) = args.first() else {
            let current = self.services.language.language().await;
            return Ok(vec![Reply::plain(format!(
                "Voice language: {current}. Change it with /language <english|hindi|hinglish>."
            ))
            .with_choices(Language::ALL.map(Language::as_str))]);
        };

        let language: Language = requested.parse().map_err(|_| {
            BotError::validation("Unsupported language. Choose one of: english, hindi, hinglish.")
        })?;
        self.services
            .language
            .set_language(language)
            .await
            .map_err(|err| {
                error!(%user_id, error = %err, "failed to persist language");
                BotError::internal("Couldn't save the language setting. Please try again.")
            })?;
        info!(%user_id, %language, "voice language changed");
        Ok(vec![Reply::plain(format!("Voice language set to {language}."))
            .with_keyboard(Keyboard::Remove)])
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
