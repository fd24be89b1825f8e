//! Minimal Telegram Bot API client: long polling, replies and voice downloads.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use shared::{
    domain::ChatId,
    protocol::{Inbound, Keyboard, Reply, ReplyFormat},
};
use thiserror::Error;

const DEFAULT_VOICE_MIME: &str = "audio/ogg";
/// Extra time on top of the long-poll timeout before the request is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Request(String),
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("telegram file has no download path")]
    MissingFilePath,
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        TelegramError::Request(err.without_url().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub voice: Option<Voice>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

/// A message reduced to what the controller understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Ready(Inbound),
    /// Needs a download before it can be handled.
    Voice { file_id: String, mime_type: String },
}

/// `None` for message kinds the bot does not handle (stickers, photos, ...).
pub fn classify(message: &Message) -> Option<Incoming> {
    if let Some(voice) = &message.voice {
        return Some(Incoming::Voice {
            file_id: voice.file_id.clone(),
            mime_type: voice
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE_MIME.to_string()),
        });
    }
    if let Some(location) = &message.location {
        return Some(Incoming::Ready(Inbound::Location {
            latitude: location.latitude,
            longitude: location.longitude,
        }));
    }
    message
        .text
        .as_deref()
        .map(|text| Incoming::Ready(Inbound::from_text(text)))
}

pub fn reply_markup(keyboard: &Keyboard) -> Value {
    match keyboard {
        Keyboard::Choices(rows) => {
            let rows: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
                .collect();
            json!({ "keyboard": rows, "one_time_keyboard": true, "resize_keyboard": true })
        }
        Keyboard::RequestLocation { label } => json!({
            "keyboard": [[{ "text": label, "request_location": true }]],
            "one_time_keyboard": true,
            "resize_keyboard": true,
        }),
        Keyboard::Remove => json!({ "remove_keyboard": true }),
    }
}

pub fn send_message_body(chat_id: ChatId, reply: &Reply) -> Value {
    let mut body = json!({ "chat_id": chat_id.0, "text": reply.text });
    if reply.format == ReplyFormat::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if let Some(keyboard) = &reply.keyboard {
        body["reply_markup"] = reply_markup(keyboard);
    }
    body
}

pub struct TelegramClient {
    http: Client,
    api_base: String,
    file_base: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> reqwest::Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            api_base: format!("{api_url}/bot{token}"),
            file_base: format!("{api_url}/file/bot{token}"),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response: ApiResponse<T> = request.send().await?.json().await?;
        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(TelegramError::Api(
                description.unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": poll_timeout.as_secs(),
                "allowed_updates": ["message"],
            }),
            Some(poll_timeout + POLL_GRACE),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: ChatId, reply: &Reply) -> Result<(), TelegramError> {
        self.call::<Value>("sendMessage", &send_message_body(chat_id, reply), None)
            .await
            .map(|_| ())
    }

    pub async fn send_typing(&self, chat_id: ChatId) -> Result<(), TelegramError> {
        self.call::<Value>(
            "sendChatAction",
            &json!({ "chat_id": chat_id.0, "action": "typing" }),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let file: File = self
            .call("getFile", &json!({ "file_id": file_id }), None)
            .await?;
        let path = file.file_path.ok_or(TelegramError::MissingFilePath)?;

        let bytes = self
            .http
            .get(format!("{}/{path}", self.file_base))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[path = "tests/telegram_tests.rs"]
mod tests;
