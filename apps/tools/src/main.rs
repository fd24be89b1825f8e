use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::{Language, UserId};
use storage::{LanguageConfig, SessionStore, DEFAULT_CONFIG_PATH, DEFAULT_SESSIONS_PATH};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_SESSIONS_PATH)]
    sessions_path: PathBuf,
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored sessions with their login time.
    ListSessions,
    /// Forget a user's tokens.
    RemoveSession { user_id: i64 },
    /// Print the voice transcription language.
    GetLanguage,
    /// Set the voice transcription language.
    SetLanguage { language: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::ListSessions => {
            let store = SessionStore::open(&cli.sessions_path).await?;
            if store.is_empty() {
                println!("no sessions in {}", cli.sessions_path.display());
            }
            for (user_id, session) in store.iter() {
                println!("user_id={user_id} login_time={}", session.login_time.to_rfc3339());
            }
        }
        Command::RemoveSession { user_id } => {
            let mut store = SessionStore::open(&cli.sessions_path).await?;
            if store.remove(UserId(user_id)).is_none() {
                bail!("no session for user_id={user_id}");
            }
            store.save().await?;
            println!("removed session for user_id={user_id}");
        }
        Command::GetLanguage => {
            let language = LanguageConfig::new(&cli.config_path).language().await;
            println!("{language} ({})", language.locale_code());
        }
        Command::SetLanguage { language } => {
            let language: Language = match language.parse() {
                Ok(language) => language,
                Err(err) => bail!(err),
            };
            LanguageConfig::new(&cli.config_path)
                .set_language(language)
                .await?;
            println!("language set to {language}");
        }
    }

    Ok(())
}
