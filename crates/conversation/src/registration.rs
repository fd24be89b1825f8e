//! Account registration as an explicit state machine.
//!
//! [`advance`] is pure: it consumes the current state, the draft and one
//! message, and returns the next state, the updated draft and what to do.
//! Only [`Output::Submit`] needs I/O, which the controller performs.

use backend_client::BackendError;
use shared::{
    domain::{username_from_email, RegistrationPayload},
    protocol::{Keyboard, Reply},
};

const MIN_PASSWORD_CHARS: usize = 6;
const DEFAULT_PHONE_NUMBER: &str = "";
const DEFAULT_DISABILITY_TYPE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    FirstName,
    LastName,
    Email,
    Password,
    ConfirmPassword,
    UserType,
    Wheelchair,
    Tactile,
    Audio,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub user_type: String,
    pub needs_wheelchair_access: bool,
    pub needs_tactile_paths: bool,
    pub needs_audio_guidance: bool,
}

impl RegistrationDraft {
    fn into_payload(self) -> RegistrationPayload {
        RegistrationPayload {
            username: username_from_email(&self.email).to_string(),
            email: self.email,
            password: self.password,
            password_confirm: self.password_confirm,
            first_name: self.first_name,
            last_name: self.last_name,
            user_type: self.user_type,
            needs_wheelchair_access: self.needs_wheelchair_access,
            needs_tactile_paths: self.needs_tactile_paths,
            needs_audio_guidance: self.needs_audio_guidance,
            phone_number: DEFAULT_PHONE_NUMBER.to_string(),
            disability_type: DEFAULT_DISABILITY_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Reply(Reply),
    /// Terminal step: register `payload` with the backend, then reply.
    Submit(RegistrationPayload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// `None` once the conversation has ended.
    pub next: Option<RegistrationState>,
    pub draft: RegistrationDraft,
    pub output: Output,
}

impl Transition {
    fn ask(next: RegistrationState, draft: RegistrationDraft, reply: Reply) -> Self {
        Self {
            next: Some(next),
            draft,
            output: Output::Reply(reply),
        }
    }
}

/// Fresh conversation; any previous draft is dropped by the caller.
pub fn start() -> (RegistrationState, RegistrationDraft, Reply) {
    (
        RegistrationState::FirstName,
        RegistrationDraft::default(),
        Reply::markdown("Let's create your account!\nWhat's your *first name*?"),
    )
}

pub fn cancel_reply() -> Reply {
    Reply::plain("Registration canceled.").with_keyboard(Keyboard::Remove)
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

fn yes_no(question: &str) -> Reply {
    Reply::markdown(question).with_choices(["Yes", "No"])
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    }
}

pub fn advance(
    state: RegistrationState,
    mut draft: RegistrationDraft,
    input: &str,
) -> Transition {
    use RegistrationState::*;

    let answer = input.trim();
    if answer.is_empty() {
        return Transition::ask(state, draft, Reply::plain("Please send a non-empty answer."));
    }

    match state {
        FirstName => {
            draft.first_name = answer.to_string();
            Transition::ask(LastName, draft, Reply::markdown("Great! Now your *last name*?"))
        }
        LastName => {
            draft.last_name = answer.to_string();
            Transition::ask(Email, draft, Reply::markdown("Enter your *email* address:"))
        }
        Email => {
            if !is_plausible_email(answer) {
                return Transition::ask(
                    Email,
                    draft,
                    Reply::plain("That doesn't look like an email address. Please try again:"),
                );
            }
            draft.email = answer.to_string();
            Transition::ask(
                Password,
                draft,
                Reply::markdown(format!(
                    "Set a *password* (min {MIN_PASSWORD_CHARS} chars):"
                )),
            )
        }
        Password => {
            if input.chars().count() < MIN_PASSWORD_CHARS {
                return Transition::ask(
                    Password,
                    draft,
                    Reply::plain(format!(
                        "Password must be at least {MIN_PASSWORD_CHARS} characters. Try again:"
                    )),
                );
            }
            draft.password = input.to_string();
            Transition::ask(
                ConfirmPassword,
                draft,
                Reply::plain("Please confirm your password:"),
            )
        }
        ConfirmPassword => {
            if input != draft.password {
                return Transition::ask(
                    Password,
                    draft,
                    Reply::plain("Passwords don't match. Please enter your password again:"),
                );
            }
            draft.password_confirm = input.to_string();
            Transition::ask(
                UserType,
                draft,
                Reply::markdown("Choose your *user type*:").with_choices(["user", "volunteer"]),
            )
        }
        UserType => {
            draft.user_type = answer.to_ascii_lowercase();
            Transition::ask(Wheelchair, draft, yes_no("Do you need *wheelchair access*?"))
        }
        Wheelchair => {
            draft.needs_wheelchair_access = is_yes(answer);
            Transition::ask(Tactile, draft, yes_no("Do you need *tactile paths*?"))
        }
        Tactile => {
            draft.needs_tactile_paths = is_yes(answer);
            Transition::ask(Audio, draft, yes_no("Do you need *audio guidance*?"))
        }
        Audio => {
            draft.needs_audio_guidance = is_yes(answer);
            let payload = draft.clone().into_payload();
            Transition {
                next: None,
                draft,
                output: Output::Submit(payload),
            }
        }
    }
}

/// Reply for the terminal registration call.
pub fn submission_reply(payload: &RegistrationPayload, result: Result<(), BackendError>) -> Reply {
    let reply = match result {
        Ok(()) => Reply::markdown(format!(
            "Registration successful!\nYou can now /login with username: *{}*",
            escape_markdown(&payload.username)
        )),
        Err(BackendError::Validation(errors)) => {
            Reply::plain(format!("Registration failed: {errors}"))
        }
        Err(err) if err.is_transport() => Reply::plain("Server connection failed."),
        Err(err) => Reply::plain(format!("Unexpected error: {}", err.body_text())),
    };
    reply.with_keyboard(Keyboard::Remove)
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
#[path = "tests/registration_tests.rs"]
mod tests;
