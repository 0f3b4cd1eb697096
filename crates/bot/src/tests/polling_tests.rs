use super::*;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use intake::IntakeContext;
use serde_json::{json, Value};
use shared::domain::{ChatId, ValidationPolicy};
use storage::RecordStore;
use tempfile::TempDir;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct Stub {
    polls: Arc<AtomicUsize>,
    webhook_cleared: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<Value>>>,
}

async fn get_updates(State(stub): State<Stub>) -> (StatusCode, Json<Value>) {
    match stub.polls.fetch_add(1, Ordering::SeqCst) {
        0 => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 0",
                "parameters": { "retry_after": 0 }
            })),
        ),
        1 => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "result": [{
                    "update_id": 7,
                    "message": {
                        "message_id": 1,
                        "date": 1_700_000_000,
                        "chat": { "id": 55, "type": "private" },
                        "text": "Name: Ada\nEmail: ada@example.com\nPhone: 555"
                    }
                }]
            })),
        ),
        _ => {
            tokio::time::sleep(Duration::from_millis(50)).await;
            (StatusCode::OK, Json(json!({ "ok": true, "result": [] })))
        }
    }
}

async fn send_message(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.sent.lock().await.push(body.clone());
    Json(json!({
        "ok": true,
        "result": {
            "message_id": 2,
            "date": 1_700_000_001,
            "chat": { "id": body["chat_id"], "type": "private" },
            "text": body["text"]
        }
    }))
}

async fn delete_webhook(State(stub): State<Stub>) -> Json<Value> {
    stub.webhook_cleared.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "ok": true, "result": true }))
}

#[tokio::test]
async fn polling_recovers_from_flood_control_and_answers_submissions() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/botTEST/deleteWebhook", post(delete_webhook))
        .route("/botTEST/getUpdates", post(get_updates))
        .route("/botTEST/sendMessage", post(send_message))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    let dir = TempDir::new().expect("tempdir");
    let store = RecordStore::new(dir.path().join("consultations.csv"));
    store.ensure_initialized().expect("init");
    let client = BotClient::with_api_url(&format!("http://{addr}"), "TEST");
    let state = AppState::new(
        IntakeContext {
            store: store.clone(),
            admin_chat_id: None,
            policy: ValidationPolicy::ContactRequired,
        },
        Arc::new(client.clone()),
        None,
    );
    let poller = Poller::new(client.clone(), Duration::from_secs(0));
    let task = tokio::spawn(async move { run(state, &client, poller).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while stub.sent.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("confirmation was sent");
    task.abort();

    assert_eq!(stub.webhook_cleared.load(Ordering::SeqCst), 1);
    assert!(stub.polls.load(Ordering::SeqCst) >= 2);
    assert_eq!(store.count(), 1);

    let sent = stub.sent.lock().await;
    assert_eq!(sent[0]["chat_id"], ChatId(55).0);
    assert!(sent[0]["text"]
        .as_str()
        .is_some_and(|text| text.starts_with("✅")));
}
