use std::{
    io::{self, Read},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{ChatId, ValidationPolicy};
use storage::RecordStore;

/// Maintenance commands for the consultation record file.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "consultations.csv")]
    file: PathBuf,
    #[arg(long, default_value = "contact_required")]
    policy: ValidationPolicy,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the file with its header row if it does not exist.
    Init,
    /// Print the number of stored consultations.
    Count,
    /// Parse a message and print the resulting record as JSON.
    Parse {
        /// Message text; read from stdin when omitted.
        text: Option<String>,
    },
    /// Parse a message and append it to the file.
    Append {
        text: Option<String>,
        #[arg(long)]
        chat_id: Option<ChatId>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = RecordStore::new(&cli.file);

    match cli.command {
        Command::Init => {
            store.ensure_initialized()?;
            println!("ready {}", store.path().display());
        }
        Command::Count => {
            println!("{}", store.try_count()?);
        }
        Command::Parse { text } => {
            let record = intake::parse_with_policy(&read_text(text)?, cli.policy)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Append { text, chat_id } => {
            let mut record = intake::parse_with_policy(&read_text(text)?, cli.policy)?;
            if let Some(chat_id) = chat_id {
                record = record.with_chat_id(chat_id);
            }
            store.ensure_initialized()?;
            let outcome = store.append(&record)?;
            println!(
                "stored row={} at {}",
                outcome.row,
                outcome.timestamp.format(storage::TIMESTAMP_FORMAT)
            );
        }
    }

    Ok(())
}

fn read_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read message from stdin")?;
            Ok(buf)
        }
    }
}
