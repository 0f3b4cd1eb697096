use std::sync::Arc;

use anyhow::Context;
use intake::IntakeContext;
use storage::RecordStore;
use telegram::{BotClient, BotError, Poller};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod polling;
mod webhook;

use app_state::AppState;
use config::{load_settings, TransportMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    init_tracing(&settings.log_level);

    let config = settings.validate().map_err(|error| {
        error!(%error, "invalid configuration");
        error
    })?;

    let store = RecordStore::new(&config.records_path);
    store.ensure_initialized().with_context(|| {
        format!(
            "failed to prepare record file {}",
            config.records_path.display()
        )
    })?;
    info!(
        path = %config.records_path.display(),
        records = store.count(),
        "record file ready"
    );
    if config.admin_chat_id.is_none() {
        warn!("ADMIN_CHAT_ID is not set; admin notifications and export are disabled");
    }

    let client = BotClient::with_api_url(&config.api_base_url, &config.token);
    match client.get_me().await {
        Ok(me) => info!(
            bot = me.username.as_deref().unwrap_or(&me.first_name),
            "connected to bot api"
        ),
        Err(error @ BotError::Api { .. }) => {
            return Err(error).context("bot api rejected the configured token")
        }
        Err(error) => warn!(%error, "bot api unreachable at startup; continuing"),
    }

    let ctx = IntakeContext {
        store,
        admin_chat_id: config.admin_chat_id,
        policy: config.policy,
    };
    let secret = match &config.transport {
        TransportMode::Webhook(hook) => hook.secret.clone(),
        TransportMode::Polling => None,
    };
    let state = AppState::new(ctx, Arc::new(client.clone()), secret);

    let run = async {
        match &config.transport {
            TransportMode::Polling => {
                let poller = Poller::new(client.clone(), config.poll_timeout);
                polling::run(state, &client, poller).await
            }
            TransportMode::Webhook(hook) => webhook::serve(state, &client, hook).await,
        }
    };

    tokio::select! {
        result = run => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }
    info!("bot stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
