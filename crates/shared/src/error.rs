use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Validation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure to hand a reply or document to the chat transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("transport rejected the call ({code}): {description}")]
    Rejected { code: i64, description: String },
    #[error("unexpected transport response: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn request(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Request(Box::new(source))
    }
}
