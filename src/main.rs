mod error;
mod group_rules;
mod ingestion;
mod logging;
mod mail_reader;
mod settings;

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info};

use crate::group_rules::group_settings::{load_group_settings, load_system_email};
use crate::ingestion::Ingestion;
use crate::mail_reader::attachments::ContentStore;
use crate::mail_reader::display;
use crate::mail_reader::imap::{check_connection, ImapMailboxes};
use crate::settings::Config;

/// Reads unread mail from the mailboxes named in the group settings on
/// stdin and prints the messages worth processing as JSON on stdout.
#[derive(Debug, Parser)]
#[command(name = "mailsift", version, about)]
struct Cli {
    /// Directory holding `temp/` and `logs/`
    #[arg(long, env = "BASE_PATH")]
    base_path: Option<String>,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, env = "MAILSIFT_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one ingestion pass (the default)
    Ingest,
    /// Log in to the mailbox given on stdin and log out again
    CheckConnection,
}

async fn ingest(config: &Config) -> anyhow::Result<()> {
    let rules = load_group_settings(io::stdin().lock()).context("Cannot read group settings from stdin")?;

    let store = ContentStore::new(&config.content_dir);
    info!(
        "Base path {:?}, writing attachments to {}",
        config.base_path,
        store.dir().display()
    );
    let ingestion = Ingestion::new(ImapMailboxes, store);
    let messages = ingestion.run(&rules).await;

    display::display_messages(&messages);
    display::write_messages(io::stdout().lock(), &messages).context("Cannot write results")?;
    Ok(())
}

async fn connection_check() -> anyhow::Result<()> {
    let mailbox = load_system_email(io::stdin().lock()).context("Cannot read system email from stdin")?;
    if let Err(e) = check_connection(&mailbox).await {
        println!("{}", e);
        return Err(e).with_context(|| format!("Connection check failed for {}", mailbox.host));
    }
    info!("Connection check passed for {}@{}", mailbox.username, mailbox.host);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::new(cli.base_path.unwrap_or_default(), &cli.log_level) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init_logger(&config) {
        eprintln!("Cannot set up logging: {}", e);
    }

    let result = match cli.command.unwrap_or(Command::Ingest) {
        Command::Ingest => ingest(&config).await,
        Command::CheckConnection => connection_check().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
