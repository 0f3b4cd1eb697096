use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::ChatId,
    error::TransportError,
    protocol::{
        ApiResponse, DeleteWebhookRequest, GetUpdatesRequest, Message, SendMessageRequest,
        SetWebhookRequest, Update, User,
    },
    transport::{ChatTransport, Document},
};
use thiserror::Error;
use tracing::debug;

mod poller;

pub use poller::Poller;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP request is
/// abandoned.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum BotError {
    #[error("bot api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bot api call {method} failed ({code}): {description}")]
    Api {
        method: &'static str,
        code: i64,
        description: String,
        retry_after: Option<u64>,
    },
    #[error("bot api call {method} returned ok without a result")]
    MissingResult { method: &'static str },
}

impl BotError {
    /// Server-requested pause before the next call, when flood control kicks in.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api {
                retry_after: Some(seconds),
                ..
            } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

impl From<BotError> for TransportError {
    fn from(value: BotError) -> Self {
        match value {
            BotError::Api {
                code, description, ..
            } => TransportError::Rejected { code, description },
            BotError::Http(error) => TransportError::request(error),
            other @ BotError::MissingResult { .. } => TransportError::Protocol(other.to_string()),
        }
    }
}

/// HTTPS client for the Telegram Bot API.
#[derive(Clone)]
pub struct BotClient {
    http: Client,
    api_url: String,
}

impl fmt::Debug for BotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the api url embeds the bot token
        f.debug_struct("BotClient").finish_non_exhaustive()
    }
}

impl BotClient {
    pub fn new(token: &str) -> Self {
        Self::with_api_url(DEFAULT_API_URL, token)
    }

    pub fn with_api_url(base_url: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            api_url: format!("{}/bot{token}", base_url.trim_end_matches('/')),
        }
    }

    pub async fn get_me(&self) -> Result<User, BotError> {
        self.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT).await
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, BotError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: vec!["message".to_string()],
        };
        self.call("getUpdates", &request, timeout + LONG_POLL_GRACE).await
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message, BotError> {
        let request = SendMessageRequest {
            chat_id,
            text: text.to_string(),
        };
        self.call("sendMessage", &request, REQUEST_TIMEOUT).await
    }

    pub async fn send_document(
        &self,
        chat_id: ChatId,
        document: Document,
    ) -> Result<Message, BotError> {
        let part = Part::bytes(document.bytes)
            .file_name(document.file_name)
            .mime_str(&document.mime_type)?;
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = document.caption {
            form = form.text("caption", caption);
        }

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        Self::decode("sendDocument", response).await
    }

    /// Registers `url` for push delivery. One connection at a time keeps
    /// updates strictly sequential.
    pub async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<bool, BotError> {
        let request = SetWebhookRequest {
            url: url.to_string(),
            secret_token: secret_token.map(str::to_string),
            max_connections: 1,
            allowed_updates: vec!["message".to_string()],
        };
        self.call("setWebhook", &request, REQUEST_TIMEOUT).await
    }

    pub async fn delete_webhook(&self) -> Result<bool, BotError> {
        let request = DeleteWebhookRequest {
            drop_pending_updates: false,
        };
        self.call("deleteWebhook", &request, REQUEST_TIMEOUT).await
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_url)
    }

    async fn call<B, T>(
        &self,
        method: &'static str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, BotError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method, "calling bot api");
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        Self::decode(method, response).await
    }

    async fn decode<T: DeserializeOwned>(
        method: &'static str,
        response: reqwest::Response,
    ) -> Result<T, BotError> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;
        if !body.ok {
            return Err(BotError::Api {
                method,
                code: body.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: body
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
                retry_after: body.parameters.and_then(|p| p.retry_after),
            });
        }
        body.result.ok_or(BotError::MissingResult { method })
    }
}

#[async_trait]
impl ChatTransport for BotClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.send_message(chat_id, text).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: Document,
    ) -> Result<(), TransportError> {
        BotClient::send_document(self, chat_id, document).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
