use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use backend_client::{Endpoints, HttpBackend, TokenManager};
use clap::Parser;
use conversation::{Controller, Services};
use report_formatter::{GeminiClient, ReportFormatter};
use shared::{
    domain::{ChatId, UserId},
    protocol::{Inbound, Reply, ReplyFormat},
};
use storage::{LanguageConfig, SessionStore};
use telegram::{classify, Incoming, Message, TelegramClient, TelegramError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dispatch;
mod telegram;

use config::{load_settings, DEFAULT_SETTINGS_FILE};
use dispatch::Dispatcher;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct Cli {
    /// Flat toml settings file; missing is fine.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config);
    let bot_token = settings
        .bot_token
        .clone()
        .context("BOT_TOKEN is not set")?;
    let gemini_api_key = settings
        .gemini_api_key
        .clone()
        .context("GEMINI_API_KEY is not set")?;

    let endpoints = Endpoints::new(&settings.backend_url, &settings.reports_url)
        .context("invalid backend url")?;
    let backend = Arc::new(
        HttpBackend::new(endpoints, settings.http_timeout())
            .context("failed to build backend http client")?,
    );

    let sessions = SessionStore::open(&settings.sessions_path).await?;
    info!(
        path = %settings.sessions_path.display(),
        sessions = sessions.len(),
        "sessions loaded"
    );

    let gemini = Arc::new(
        GeminiClient::new(gemini_api_key, &settings.gemini_model, settings.http_timeout())
            .context("failed to build gemini http client")?
            .with_base_url(&settings.gemini_base_url),
    );

    let controller = Arc::new(Controller::new(Services {
        tokens: Arc::new(TokenManager::new(backend.clone(), sessions)),
        backend,
        formatter: Arc::new(ReportFormatter::new(gemini.clone())),
        transcriber: gemini,
        language: LanguageConfig::new(&settings.config_path),
        echo_report_json: settings.echo_report_json,
    }));

    let telegram = Arc::new(
        TelegramClient::new(
            &settings.telegram_api_url,
            &bot_token,
            settings.http_timeout(),
        )
        .context("failed to build telegram http client")?,
    );

    info!(
        backend = %settings.backend_url,
        model = %settings.gemini_model,
        "bot is polling for updates"
    );

    let mut dispatcher = {
        let telegram = telegram.clone();
        Dispatcher::new(move |user_id: UserId, message: Message| {
            handle_message(telegram.clone(), controller.clone(), user_id, message)
        })
    };

    let mut offset = 0;
    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            updates = telegram.get_updates(offset, settings.poll_timeout()) => updates,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(err) => {
                error!(error = %err, "failed to fetch updates");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            match message.from.as_ref().map(|user| UserId(user.id)) {
                Some(user_id) => dispatcher.dispatch(user_id, message),
                None => debug!(chat_id = message.chat.id, "ignoring message without sender"),
            }
        }
    }

    Ok(())
}

async fn handle_message(
    telegram: Arc<TelegramClient>,
    controller: Arc<Controller>,
    user_id: UserId,
    message: Message,
) {
    let chat_id = ChatId(message.chat.id);
    let Some(incoming) = classify(&message) else {
        debug!(%chat_id, %user_id, "ignoring unsupported message");
        return;
    };

    if let Err(err) = telegram.send_typing(chat_id).await {
        warn!(%chat_id, error = %err, "failed to send typing action");
    }

    let inbound = match incoming {
        Incoming::Ready(inbound) => inbound,
        Incoming::Voice { file_id, mime_type } => match telegram.download_file(&file_id).await {
            Ok(audio) => Inbound::Voice { audio, mime_type },
            Err(err) => {
                error!(%chat_id, %user_id, error = %err, "failed to download voice message");
                deliver(
                    &telegram,
                    chat_id,
                    Reply::plain("Couldn't download your voice message. Please try again."),
                )
                .await;
                return;
            }
        },
    };

    for reply in controller.handle(user_id, inbound).await {
        deliver(&telegram, chat_id, reply).await;
    }
}

/// Sends `reply`, retrying once as plain text when Telegram rejects the markdown.
async fn deliver(telegram: &TelegramClient, chat_id: ChatId, reply: Reply) {
    match telegram.send_message(chat_id, &reply).await {
        Ok(()) => {}
        Err(TelegramError::Api(description)) if reply.format == ReplyFormat::Markdown => {
            warn!(%chat_id, %description, "markdown rejected, resending as plain text");
            let plain = Reply {
                format: ReplyFormat::Plain,
                ..reply
            };
            if let Err(err) = telegram.send_message(chat_id, &plain).await {
                error!(%chat_id, error = %err, "failed to send reply");
            }
        }
        Err(err) => error!(%chat_id, error = %err, "failed to send reply"),
    }
}
