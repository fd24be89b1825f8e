use serde::{Deserialize, Serialize};

/// One inbound chat event, already stripped of transport details.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command { name: String, args: Vec<String> },
    Text(String),
    Voice { audio: Vec<u8>, mime_type: String },
    Location { latitude: f64, longitude: f64 },
}

impl Inbound {
    /// Splits `/name@bot arg1 arg2` into a command, anything else is free text.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(body) = trimmed.strip_prefix('/') else {
            return Inbound::Text(text.to_string());
        };

        let mut words = body.split_whitespace();
        let head = words.next().unwrap_or_default();
        let name = head.split('@').next().unwrap_or_default();
        if name.is_empty() {
            return Inbound::Text(text.to_string());
        }

        Inbound::Command {
            name: name.to_ascii_lowercase(),
            args: words.map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyFormat {
    #[default]
    Plain,
    Markdown,
}

/// One-shot reply keyboard presented with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    Choices(Vec<Vec<String>>),
    RequestLocation { label: String },
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: ReplyFormat,
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Plain,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: ReplyFormat::Markdown,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_choices<const N: usize>(self, choices: [&str; N]) -> Self {
        self.with_keyboard(Keyboard::Choices(vec![choices
            .iter()
            .map(|choice| choice.to_string())
            .collect()]))
    }
}
