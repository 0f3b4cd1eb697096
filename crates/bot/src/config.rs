use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use shared::domain::{ChatId, ValidationPolicy};
use url::Url;

pub const CONFIG_FILE: &str = "bot.toml";
pub const DEFAULT_WEBHOOK_PATH: &str = "/telegram/webhook";

/// Raw settings as read from defaults, `bot.toml` and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bot_token: Option<String>,
    pub admin_chat_id: Option<String>,
    pub records_path: String,
    pub log_level: String,
    pub transport: String,
    pub webhook_bind: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub poll_timeout_seconds: String,
    pub validation_policy: String,
    pub api_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_chat_id: None,
            records_path: "consultations.csv".into(),
            log_level: "info".into(),
            transport: "polling".into(),
            webhook_bind: "0.0.0.0:8443".into(),
            webhook_url: None,
            webhook_secret: None,
            poll_timeout_seconds: "30".into(),
            validation_policy: "contact_required".into(),
            api_base_url: telegram::DEFAULT_API_URL.into(),
        }
    }
}

/// Setting key in `bot.toml` and its plain environment variable. Every key
/// can also be set through `APP__<KEY>`.
const KEYS: &[(&str, &str)] = &[
    ("bot_token", "BOT_TOKEN"),
    ("admin_chat_id", "ADMIN_CHAT_ID"),
    ("records_path", "CONSULTATIONS_FILE_PATH"),
    ("log_level", "LOG_LEVEL"),
    ("transport", "TRANSPORT_MODE"),
    ("webhook_bind", "WEBHOOK_BIND"),
    ("webhook_url", "WEBHOOK_URL"),
    ("webhook_secret", "WEBHOOK_SECRET"),
    ("poll_timeout_seconds", "POLL_TIMEOUT_SECONDS"),
    ("validation_policy", "VALIDATION_POLICY"),
    ("api_base_url", "TELEGRAM_API_URL"),
];

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |name| std::env::var(name).ok())
}

pub fn load_settings_from(config_file: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_file) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            for (key, _) in KEYS {
                match file_cfg.get(*key) {
                    Some(toml::Value::String(v)) => settings.apply(key, v.clone()),
                    Some(other) => settings.apply(key, other.to_string()),
                    None => {}
                }
            }
        }
    }

    for (key, env_name) in KEYS {
        if let Some(v) = env(env_name) {
            settings.apply(key, v);
        }
        if let Some(v) = env(&format!("APP__{}", key.to_ascii_uppercase())) {
            settings.apply(key, v);
        }
    }

    settings
}

impl Settings {
    fn apply(&mut self, key: &str, value: String) {
        match key {
            "bot_token" => self.bot_token = Some(value),
            "admin_chat_id" => self.admin_chat_id = Some(value),
            "records_path" => self.records_path = value,
            "log_level" => self.log_level = value,
            "transport" => self.transport = value,
            "webhook_bind" => self.webhook_bind = value,
            "webhook_url" => self.webhook_url = Some(value),
            "webhook_secret" => self.webhook_secret = Some(value),
            "poll_timeout_seconds" => self.poll_timeout_seconds = value,
            "validation_policy" => self.validation_policy = value,
            "api_base_url" => self.api_base_url = value,
            _ => {}
        }
    }

    /// Checks the settings needed to start. A missing bot token is fatal.
    pub fn validate(self) -> anyhow::Result<BotConfig> {
        let token = non_blank(self.bot_token)
            .ok_or_else(|| anyhow!("BOT_TOKEN is not set; the bot cannot start without it"))?;

        let admin_chat_id = non_blank(self.admin_chat_id)
            .map(|raw| {
                raw.parse::<ChatId>()
                    .with_context(|| format!("ADMIN_CHAT_ID '{raw}' is not a numeric chat id"))
            })
            .transpose()?;

        let policy = self
            .validation_policy
            .parse::<ValidationPolicy>()
            .map_err(|e| anyhow!("VALIDATION_POLICY: {e}"))?;

        let poll_timeout = self
            .poll_timeout_seconds
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .with_context(|| {
                format!(
                    "POLL_TIMEOUT_SECONDS '{}' is not a whole number of seconds",
                    self.poll_timeout_seconds
                )
            })?;

        let transport = match self.transport.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => TransportMode::Polling,
            "webhook" | "push" => TransportMode::Webhook(webhook_config(
                &self.webhook_bind,
                self.webhook_url,
                self.webhook_secret,
            )?),
            other => bail!("TRANSPORT_MODE '{other}' is not one of: polling, webhook"),
        };

        Ok(BotConfig {
            token,
            admin_chat_id,
            records_path: PathBuf::from(self.records_path.trim()),
            transport,
            poll_timeout,
            policy,
            api_base_url: self.api_base_url,
        })
    }
}

/// Validated startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: String,
    pub admin_chat_id: Option<ChatId>,
    pub records_path: PathBuf,
    pub transport: TransportMode,
    pub poll_timeout: Duration,
    pub policy: ValidationPolicy,
    pub api_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    Polling,
    Webhook(WebhookConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub bind: SocketAddr,
    pub url: Url,
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// Local route that receives updates: the path of the public url.
    pub fn route(&self) -> String {
        match self.url.path() {
            "" | "/" => DEFAULT_WEBHOOK_PATH.to_string(),
            path => path.to_string(),
        }
    }
}

fn webhook_config(
    bind: &str,
    url: Option<String>,
    secret: Option<String>,
) -> anyhow::Result<WebhookConfig> {
    let raw_url =
        non_blank(url).ok_or_else(|| anyhow!("WEBHOOK_URL is required in webhook mode"))?;
    let url = Url::parse(&raw_url).with_context(|| format!("WEBHOOK_URL '{raw_url}' is invalid"))?;
    if url.scheme() != "https" {
        bail!("WEBHOOK_URL must use https, got '{}'", url.scheme());
    }

    let bind: SocketAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("WEBHOOK_BIND '{bind}' is not a socket address"))?;

    let secret = non_blank(secret);
    if let Some(secret) = &secret {
        let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if secret.len() > 256 || !secret.chars().all(allowed) {
            bail!("WEBHOOK_SECRET must be 1-256 characters of A-Z, a-z, 0-9, _ or -");
        }
    }

    Ok(WebhookConfig { bind, url, secret })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
