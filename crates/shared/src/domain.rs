use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map($name)
            }
        }
    };
}

id_newtype!(ChatId);
id_newtype!(UserId);
id_newtype!(MessageId);

/// Which fields a line-oriented submission must carry to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Any single parsed pair is enough.
    AnyField,
    /// `name`, `email` and `phone` must all be present.
    #[default]
    ContactRequired,
}

impl ValidationPolicy {
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::AnyField => &[],
            Self::ContactRequired => &["name", "email", "phone"],
        }
    }
}

impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any_field" | "any" | "loose" => Ok(Self::AnyField),
            "contact_required" | "contact" | "strict" => Ok(Self::ContactRequired),
            other => Err(format!("unknown validation policy '{other}'")),
        }
    }
}

/// One submitted consultation request.
///
/// Fields the intake form knows about are named; anything else a sender
/// writes is kept in `extra` under its normalized key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ConsultationRecord {
    pub const KNOWN_FIELDS: [&'static str; 7] = [
        "name",
        "phone",
        "email",
        "age",
        "consultation_type",
        "message",
        "date",
    ];

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// `chat_id` is not settable here; callers attach it with
    /// [`ConsultationRecord::with_chat_id`].
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.slot_mut(key) {
            Some(slot) => *slot = Some(value),
            None if key == "chat_id" => {}
            None => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "name" => self.name.as_deref(),
            "phone" => self.phone.as_deref(),
            "email" => self.email.as_deref(),
            "age" => self.age.as_deref(),
            "consultation_type" => self.consultation_type.as_deref(),
            "message" => self.message.as_deref(),
            "date" => self.date.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }

    pub fn with_chat_id(mut self, chat_id: ChatId) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    /// True when no field other than `chat_id` carries a value.
    pub fn is_empty(&self) -> bool {
        Self::KNOWN_FIELDS.iter().all(|key| self.get(key).is_none()) && self.extra.is_empty()
    }

    /// Every populated field in a stable order: known fields first, then
    /// overflow keys alphabetically.
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let known = Self::KNOWN_FIELDS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)));
        let extra = self
            .extra
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()));
        known.chain(extra).collect()
    }

    pub fn missing_required(&self, policy: ValidationPolicy) -> Vec<&'static str> {
        policy
            .required_fields()
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none())
            .collect()
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "name" => Some(&mut self.name),
            "phone" => Some(&mut self.phone),
            "email" => Some(&mut self.email),
            "age" => Some(&mut self.age),
            "consultation_type" => Some(&mut self.consultation_type),
            "message" => Some(&mut self.message),
            "date" => Some(&mut self.date),
            _ => None,
        }
    }
}

/// A text message from the chat transport, stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender_name: Option<String>,
    pub text: String,
}
