use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use msubot::archive::move_tracked_section;
use msubot::atlas::AtlasClient;
use msubot::config::AppConfig;
use msubot::notify::SmsClient;
use msubot::section::parse_section_bytes;
use msubot::store::SqliteDocumentStore;
use msubot::users::lookup_user_number;

/// Config file used when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "msubot.json";

#[derive(Debug, Parser)]
#[command(name = "msubot", version, about = "Course section seat tracker")]
struct Cli {
    /// Path to the JSON config file (defaults to ./msubot.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a saved section listing page and print the sections as JSON
    Parse {
        file: PathBuf,
        #[arg(long)]
        crn: Option<String>,
    },
    /// Request a course's section listing from the portal
    Fetch {
        #[arg(long)]
        term: String,
        #[arg(long)]
        dept: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        crn: Option<String>,
    },
    /// Move a tracked subscription into the archive
    Migrate {
        #[arg(long)]
        term: String,
        #[arg(long)]
        crn: String,
        #[arg(long)]
        tracked_id: String,
    },
    /// Text a user
    Notify {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Parse { file, crn } => {
            let body =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let sections = parse_section_bytes(&body, crn.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&sections)?);
        }
        Command::Fetch {
            term,
            dept,
            course,
            crn,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let client = AtlasClient::new(config.atlas)?;
            let sections: Vec<_> = match crn {
                Some(crn) => client
                    .find_section(&term, &dept, &course, &crn)
                    .await?
                    .into_iter()
                    .collect(),
                None => client.fetch_sections(&term, &dept, &course).await?,
            };
            println!("{}", serde_json::to_string_pretty(&sections)?);
        }
        Command::Migrate {
            term,
            crn,
            tracked_id,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let store = SqliteDocumentStore::open(&config.store.path)?;
            let outcome = move_tracked_section(&store, &crn, &tracked_id, &term)
                .with_context(|| format!("archiving sections_tracked/{}", tracked_id))?;
            info!(archive = %outcome.archive(), "Migration finished");
        }
        Command::Notify { user_id, message } => {
            let config = load_config(cli.config.as_deref())?;
            let Some(sms) = config.sms else {
                bail!("config has no `sms` section");
            };
            let store = SqliteDocumentStore::open(&config.store.path)?;
            let number = lookup_user_number(&store, &user_id)?;
            let attempt = SmsClient::new(sms)?.send_text(&number, &message).await?;
            if !attempt.accepted() {
                bail!("gateway rejected the message with status {}", attempt.status);
            }
        }
    }

    Ok(())
}

/// Loads the given config, or the default file if it exists, or defaults.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => {
            info!("No config file found, using defaults");
            AppConfig::default()
        }
    };
    Ok(config)
}
