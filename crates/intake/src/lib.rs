use chrono::Local;
use shared::{
    domain::{ChatId, ConsultationRecord, InboundMessage, ValidationPolicy},
    error::TransportError,
    transport::{ChatTransport, Document},
};
use storage::{AppendOutcome, RecordStore, StoreError};
use thiserror::Error;
use tracing::{error, info, warn};

pub mod parser;
pub mod replies;

pub use parser::{normalize_key, parse, parse_with_policy, ParseError};

const EXPORT_MIME_TYPE: &str = "text/csv";

/// Everything a handler needs, built once at startup and passed in.
#[derive(Debug, Clone)]
pub struct IntakeContext {
    pub store: RecordStore,
    pub admin_chat_id: Option<ChatId>,
    pub policy: ValidationPolicy,
}

impl IntakeContext {
    pub fn is_admin(&self, chat_id: ChatId) -> bool {
        self.admin_chat_id == Some(chat_id)
    }
}

#[derive(Debug, Error)]
pub enum HandlingError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to persist consultation: {0}")]
    Store(#[source] StoreError),
    #[error("failed to export consultations: {0}")]
    Export(#[source] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("chat {0} is not allowed to use this command")]
    Unauthorized(ChatId),
    #[error("record store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    GetConsultations,
    Stats,
    Unknown,
}

impl Command {
    /// `None` when `text` is not a slash command.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or_default();
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "get_consultations" => Self::GetConsultations,
            "stats" => Self::Stats,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Greeted,
    HelpShown,
    StatsShown { count: usize },
    Exported { count: usize },
    NoExportFile,
    UnknownCommand,
    Stored { row: usize, admin_notified: bool },
}

/// Handles one inbound message and never fails: every error is logged and
/// answered with the matching reply.
pub async fn dispatch(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    inbound: &InboundMessage,
) -> Option<Handled> {
    let chat_id = inbound.chat_id;
    let error = match handle_inbound(ctx, transport, inbound).await {
        Ok(handled) => return Some(handled),
        Err(error) => error,
    };

    let reply = match &error {
        HandlingError::Parse(parse_error) => {
            info!(%chat_id, error = %parse_error, "rejected consultation message");
            replies::format_help(parse_error)
        }
        HandlingError::Store(store_error) => {
            error!(%chat_id, error = %store_error, "failed to store consultation");
            replies::STORE_FAILURE.to_string()
        }
        HandlingError::Export(store_error) => {
            error!(%chat_id, error = %store_error, "failed to export consultations");
            replies::EXPORT_FAILURE.to_string()
        }
        HandlingError::Unauthorized(_) => {
            warn!(%chat_id, "admin-only command from unauthorized chat");
            replies::ACCESS_DENIED.to_string()
        }
        HandlingError::Transport(_) | HandlingError::Task(_) => {
            error!(%chat_id, %error, "failed to handle message");
            replies::GENERIC_APOLOGY.to_string()
        }
    };

    if let Err(send_error) = transport.send_text(chat_id, &reply).await {
        error!(%chat_id, error = %send_error, "failed to deliver error reply");
    }
    None
}

pub async fn handle_inbound(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    inbound: &InboundMessage,
) -> Result<Handled, HandlingError> {
    let chat_id = inbound.chat_id;
    match Command::parse(&inbound.text) {
        Some(Command::Start) => {
            let text = replies::start_text(inbound.sender_name.as_deref());
            transport.send_text(chat_id, &text).await?;
            Ok(Handled::Greeted)
        }
        Some(Command::Help) => {
            transport.send_text(chat_id, &replies::help_text()).await?;
            Ok(Handled::HelpShown)
        }
        Some(Command::Stats) => handle_stats(ctx, transport, chat_id).await,
        Some(Command::GetConsultations) => handle_export(ctx, transport, chat_id).await,
        Some(Command::Unknown) => {
            transport.send_text(chat_id, replies::UNKNOWN_COMMAND).await?;
            Ok(Handled::UnknownCommand)
        }
        None => handle_submission(ctx, transport, inbound).await,
    }
}

async fn handle_submission(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    inbound: &InboundMessage,
) -> Result<Handled, HandlingError> {
    let chat_id = inbound.chat_id;
    let record = parse_with_policy(&inbound.text, ctx.policy)?.with_chat_id(chat_id);

    let stored = record.clone();
    let outcome = with_store(&ctx.store, move |store| store.append(&stored))
        .await?
        .map_err(HandlingError::Store)?;
    info!(%chat_id, row = outcome.row, "stored consultation request");

    let confirmed = transport
        .send_text(chat_id, &replies::confirmation(&record))
        .await;
    let admin_notified = notify_admin(ctx, transport, &record, &outcome).await;
    confirmed?;

    Ok(Handled::Stored {
        row: outcome.row,
        admin_notified,
    })
}

/// Forwards a stored record to the admin chat. Failures are logged only.
async fn notify_admin(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    record: &ConsultationRecord,
    outcome: &AppendOutcome,
) -> bool {
    let Some(admin_chat_id) = ctx.admin_chat_id else {
        return false;
    };
    if record.chat_id == Some(admin_chat_id) {
        return false;
    }

    let text = replies::admin_notification(record, outcome);
    match transport.send_text(admin_chat_id, &text).await {
        Ok(()) => true,
        Err(error) => {
            warn!(%admin_chat_id, %error, "failed to notify admin of consultation");
            false
        }
    }
}

async fn handle_stats(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    chat_id: ChatId,
) -> Result<Handled, HandlingError> {
    let count = with_store(&ctx.store, |store| store.count()).await?;
    let text = replies::stats_text(count, &ctx.store.file_name(), Local::now().naive_local());
    transport.send_text(chat_id, &text).await?;
    Ok(Handled::StatsShown { count })
}

async fn handle_export(
    ctx: &IntakeContext,
    transport: &dyn ChatTransport,
    chat_id: ChatId,
) -> Result<Handled, HandlingError> {
    if !ctx.is_admin(chat_id) {
        return Err(HandlingError::Unauthorized(chat_id));
    }

    let snapshot = with_store(&ctx.store, |store| -> Result<_, StoreError> {
        if !store.exists() {
            return Ok(None);
        }
        let bytes = store.snapshot()?;
        Ok(Some((bytes, store.count())))
    })
    .await?
    .map_err(HandlingError::Export)?;

    let Some((bytes, count)) = snapshot else {
        transport.send_text(chat_id, replies::NO_EXPORT_FILE).await?;
        return Ok(Handled::NoExportFile);
    };

    let now = Local::now().naive_local();
    let document = Document {
        file_name: replies::export_file_name(now),
        mime_type: EXPORT_MIME_TYPE.to_string(),
        bytes,
        caption: Some(replies::export_caption(count, now)),
    };
    transport.send_document(chat_id, document).await?;
    info!(%chat_id, count, "sent consultations export");
    Ok(Handled::Exported { count })
}

/// Runs file work off the async executor.
async fn with_store<T, F>(store: &RecordStore, work: F) -> Result<T, HandlingError>
where
    F: FnOnce(&RecordStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || work(&store))
        .await
        .map_err(|e| HandlingError::Task(e.to_string()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
