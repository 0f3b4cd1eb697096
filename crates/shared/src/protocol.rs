//! Wire shapes of the Telegram Bot API, limited to what the intake bot
//! sends and receives.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, InboundMessage, MessageId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

impl Update {
    /// The text message carried by this update, if any.
    pub fn inbound(&self) -> Option<InboundMessage> {
        let message = self.message.as_ref()?;
        let text = message.text.as_ref()?;
        Some(InboundMessage {
            chat_id: message.chat.id,
            sender_name: message.from.as_ref().map(User::display_name),
            text: text.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: ChatId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWebhookRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
    pub max_connections: u32,
    pub allowed_updates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteWebhookRequest {
    pub drop_pending_updates: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_update_becomes_inbound_message() {
        let raw = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 3,
                "date": 1700000000,
                "chat": { "id": 555, "type": "private" },
                "from": { "id": 555, "is_bot": false, "first_name": "Ada", "last_name": "L" },
                "text": "Name: Ada"
            }
        });
        let update: Update = serde_json::from_value(raw).expect("update");
        let inbound = update.inbound().expect("inbound");
        assert_eq!(inbound.chat_id, ChatId(555));
        assert_eq!(inbound.sender_name.as_deref(), Some("Ada L"));
        assert_eq!(inbound.text, "Name: Ada");
    }

    #[test]
    fn non_text_update_is_skipped() {
        let raw = serde_json::json!({
            "update_id": 11,
            "message": {
                "message_id": 4,
                "chat": { "id": 1, "type": "private" }
            }
        });
        let update: Update = serde_json::from_value(raw).expect("update");
        assert!(update.inbound().is_none());

        let bare: Update = serde_json::from_value(serde_json::json!({ "update_id": 12 }))
            .expect("bare update");
        assert!(bare.inbound().is_none());
    }

    #[test]
    fn error_response_carries_retry_after() {
        let raw = r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#;
        let response: ApiResponse<bool> = serde_json::from_str(raw).expect("response");
        assert!(!response.ok);
        assert_eq!(response.error_code, Some(429));
        assert_eq!(
            response.parameters.and_then(|p| p.retry_after),
            Some(3)
        );
    }
}
