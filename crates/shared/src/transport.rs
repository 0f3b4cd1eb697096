use async_trait::async_trait;

use crate::{domain::ChatId, error::TransportError};

/// A file sent to a chat as a downloadable attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Outbound side of the chat protocol.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
    async fn send_document(&self, chat_id: ChatId, document: Document)
        -> Result<(), TransportError>;
}
