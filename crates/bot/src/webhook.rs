use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::Update,
};
use telegram::BotClient;
use tracing::{info, warn};

use crate::{app_state::AppState, config::WebhookConfig};

pub(crate) const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Registers the public url with the bot api and serves pushed updates.
pub(crate) async fn serve(
    state: AppState,
    client: &BotClient,
    config: &WebhookConfig,
) -> anyhow::Result<()> {
    client
        .set_webhook(config.url.as_str(), config.secret.as_deref())
        .await
        .context("failed to register webhook")?;
    info!(url = %config.url, "webhook registered");

    let app = build_router(state, &config.route());
    info!(addr = %config.bind, "webhook listening");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn build_router(state: AppState, route: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(route, post(receive_update))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn receive_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    if let Some(expected) = &state.webhook_secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            warn!("rejected webhook call without a valid secret token");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new(
                    ErrorCode::Unauthorized,
                    "invalid secret token",
                )),
            ));
        }
    }

    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "webhook body is not an update");
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, e.to_string())),
        )
    })?;

    state.process_update(&update).await;
    Ok(StatusCode::OK)
}

#[cfg(test)]
#[path = "tests/webhook_tests.rs"]
mod tests;
