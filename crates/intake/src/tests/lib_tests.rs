use super::*;

use std::collections::HashSet;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;

const ADMIN: ChatId = ChatId(1);
const PATIENT: ChatId = ChatId(200);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text(ChatId, String),
    Document(ChatId, Document),
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    unreachable: HashSet<ChatId>,
}

impl RecordingTransport {
    fn failing_for(chats: &[ChatId]) -> Self {
        Self {
            sent: Mutex::default(),
            unreachable: chats.iter().copied().collect(),
        }
    }

    async fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|sent| match sent {
                Sent::Text(to, text) if *to == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn documents_to(&self, chat_id: ChatId) -> Vec<Document> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|sent| match sent {
                Sent::Document(to, document) if *to == chat_id => Some(document.clone()),
                _ => None,
            })
            .collect()
    }

    fn refuse(&self, chat_id: ChatId) -> Result<(), TransportError> {
        if self.unreachable.contains(&chat_id) {
            return Err(TransportError::Rejected {
                code: 403,
                description: "Forbidden: bot was blocked by the user".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.refuse(chat_id)?;
        self.sent
            .lock()
            .await
            .push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: Document,
    ) -> Result<(), TransportError> {
        self.refuse(chat_id)?;
        self.sent.lock().await.push(Sent::Document(chat_id, document));
        Ok(())
    }
}

fn setup(admin: Option<ChatId>) -> (TempDir, IntakeContext) {
    let dir = TempDir::new().expect("tempdir");
    let store = RecordStore::new(dir.path().join("consultations.csv"));
    store.ensure_initialized().expect("init");
    (
        dir,
        IntakeContext {
            store,
            admin_chat_id: admin,
            policy: ValidationPolicy::ContactRequired,
        },
    )
}

fn message(chat_id: ChatId, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id,
        sender_name: Some("Ada".into()),
        text: text.into(),
    }
}

const VALID: &str = "New consultation request\nName: Ada\nEmail: ada@example.com\nPhone: 555\nMessage: see you at 10:30";

#[test]
fn commands_are_recognized_with_bot_suffix() {
    assert_eq!(Command::parse("/start"), Some(Command::Start));
    assert_eq!(Command::parse("  /HELP extra"), Some(Command::Help));
    assert_eq!(
        Command::parse("/get_consultations@IntakeBot"),
        Some(Command::GetConsultations)
    );
    assert_eq!(Command::parse("/stats"), Some(Command::Stats));
    assert_eq!(Command::parse("/launch"), Some(Command::Unknown));
    assert_eq!(Command::parse("Name: /start"), None);
}

#[tokio::test]
async fn valid_submission_is_stored_confirmed_and_forwarded() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::default();

    let handled = dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;
    assert_eq!(
        handled,
        Some(Handled::Stored {
            row: 2,
            admin_notified: true
        })
    );
    assert_eq!(ctx.store.count(), 1);

    let to_patient = transport.texts_to(PATIENT).await;
    assert_eq!(to_patient.len(), 1);
    assert!(to_patient[0].starts_with("✅ Consultation request received!"));
    assert!(to_patient[0].contains("💬 Message: see you at 10:30"));

    let to_admin = transport.texts_to(ADMIN).await;
    assert_eq!(to_admin.len(), 1);
    assert!(to_admin[0].contains("📱 Chat ID: 200"));
}

#[tokio::test]
async fn admin_is_not_forwarded_their_own_submission() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::default();

    let handled = dispatch(&ctx, &transport, &message(ADMIN, VALID)).await;
    assert_eq!(
        handled,
        Some(Handled::Stored {
            row: 2,
            admin_notified: false
        })
    );
    assert_eq!(transport.texts_to(ADMIN).await.len(), 1);
}

#[tokio::test]
async fn admin_delivery_failure_does_not_reach_submitter() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::failing_for(&[ADMIN]);

    let handled = dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;
    assert_eq!(
        handled,
        Some(Handled::Stored {
            row: 2,
            admin_notified: false
        })
    );
    let to_patient = transport.texts_to(PATIENT).await;
    assert_eq!(to_patient.len(), 1);
    assert!(to_patient[0].starts_with("✅"));
}

#[tokio::test]
async fn incomplete_submission_gets_format_help_and_is_not_stored() {
    let (_dir, ctx) = setup(None);
    let transport = RecordingTransport::default();

    let handled = dispatch(&ctx, &transport, &message(PATIENT, "Name: Ada\nPhone: 555")).await;
    assert_eq!(handled, None);
    assert_eq!(ctx.store.count(), 0);

    let to_patient = transport.texts_to(PATIENT).await;
    assert_eq!(to_patient.len(), 1);
    assert!(to_patient[0].contains("Missing required fields: email."));
}

#[tokio::test]
async fn json_submission_is_accepted() {
    let (_dir, ctx) = setup(None);
    let transport = RecordingTransport::default();

    let text = r#"{"name": "Ada", "email": "ada@example.com", "phone": "555", "age": 36}"#;
    let handled = handle_inbound(&ctx, &transport, &message(PATIENT, text))
        .await
        .expect("handled");
    assert_eq!(
        handled,
        Handled::Stored {
            row: 2,
            admin_notified: false
        }
    );
    assert!(transport.texts_to(PATIENT).await[0].contains("🎂 Age: 36"));
}

#[tokio::test]
async fn empty_json_object_is_answered_with_format_help() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::default();

    for text in ["{}", r#"{"name": null, "chat_id": 5}"#] {
        let handled = dispatch(&ctx, &transport, &message(PATIENT, text)).await;
        assert_eq!(handled, None);
    }
    assert_eq!(ctx.store.count(), 0);

    let to_patient = transport.texts_to(PATIENT).await;
    assert_eq!(to_patient.len(), 2);
    assert!(to_patient
        .iter()
        .all(|text| text.starts_with("❌ Unable to parse consultation request.")));
    assert!(transport.texts_to(ADMIN).await.is_empty());
}

#[tokio::test]
async fn store_failure_asks_submitter_to_retry() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = IntakeContext {
        store: RecordStore::new(dir.path().join("never-initialized.csv")),
        admin_chat_id: Some(ADMIN),
        policy: ValidationPolicy::ContactRequired,
    };
    let transport = RecordingTransport::default();

    let err = handle_inbound(&ctx, &transport, &message(PATIENT, VALID))
        .await
        .expect_err("store should fail");
    assert!(matches!(err, HandlingError::Store(StoreError::Missing { .. })));

    dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;
    assert_eq!(
        transport.texts_to(PATIENT).await,
        vec![replies::STORE_FAILURE.to_string()]
    );
    assert!(transport.texts_to(ADMIN).await.is_empty());
}

#[tokio::test]
async fn undeliverable_confirmation_still_keeps_record_and_notifies_admin() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::failing_for(&[PATIENT]);

    let err = handle_inbound(&ctx, &transport, &message(PATIENT, VALID))
        .await
        .expect_err("confirmation cannot be delivered");
    assert!(matches!(err, HandlingError::Transport(_)));
    assert_eq!(ctx.store.count(), 1);
    assert_eq!(transport.texts_to(ADMIN).await.len(), 1);

    assert_eq!(dispatch(&ctx, &transport, &message(PATIENT, VALID)).await, None);
    assert_eq!(ctx.store.count(), 2);
}

#[tokio::test]
async fn export_is_admin_only() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::default();

    let handled = dispatch(&ctx, &transport, &message(PATIENT, "/get_consultations")).await;
    assert_eq!(handled, None);
    assert_eq!(
        transport.texts_to(PATIENT).await,
        vec![replies::ACCESS_DENIED.to_string()]
    );
    assert!(transport.documents_to(PATIENT).await.is_empty());
}

#[tokio::test]
async fn export_is_denied_when_no_admin_is_configured() {
    let (_dir, ctx) = setup(None);
    let transport = RecordingTransport::default();

    let err = handle_inbound(&ctx, &transport, &message(PATIENT, "/get_consultations"))
        .await
        .expect_err("no admin configured");
    assert!(matches!(err, HandlingError::Unauthorized(PATIENT)));
}

#[tokio::test]
async fn admin_receives_file_with_row_count_caption() {
    let (_dir, ctx) = setup(Some(ADMIN));
    let transport = RecordingTransport::default();
    dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;
    dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;

    let handled = dispatch(&ctx, &transport, &message(ADMIN, "/get_consultations")).await;
    assert_eq!(handled, Some(Handled::Exported { count: 2 }));

    let documents = transport.documents_to(ADMIN).await;
    assert_eq!(documents.len(), 1);
    let document = &documents[0];
    assert!(document.file_name.starts_with("consultations_"));
    assert!(document.file_name.ends_with(".csv"));
    assert_eq!(document.mime_type, "text/csv");
    assert_eq!(document.bytes, ctx.store.snapshot().expect("snapshot"));
    assert!(document
        .caption
        .as_deref()
        .is_some_and(|caption| caption.contains("Total consultations: 2")));
}

#[tokio::test]
async fn export_without_file_says_so() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = IntakeContext {
        store: RecordStore::new(dir.path().join("absent.csv")),
        admin_chat_id: Some(ADMIN),
        policy: ValidationPolicy::ContactRequired,
    };
    let transport = RecordingTransport::default();

    let handled = dispatch(&ctx, &transport, &message(ADMIN, "/get_consultations")).await;
    assert_eq!(handled, Some(Handled::NoExportFile));
    assert_eq!(
        transport.texts_to(ADMIN).await,
        vec![replies::NO_EXPORT_FILE.to_string()]
    );
}

#[tokio::test]
async fn stats_report_current_count() {
    let (_dir, ctx) = setup(None);
    let transport = RecordingTransport::default();
    dispatch(&ctx, &transport, &message(PATIENT, VALID)).await;

    let handled = dispatch(&ctx, &transport, &message(PATIENT, "/stats")).await;
    assert_eq!(handled, Some(Handled::StatsShown { count: 1 }));
    let last = transport.texts_to(PATIENT).await.pop().expect("stats reply");
    assert!(last.contains("Total consultations: 1"));
    assert!(last.contains("File: consultations.csv"));
}

#[tokio::test]
async fn start_greets_sender_by_name_and_unknown_commands_point_to_help() {
    let (_dir, ctx) = setup(None);
    let transport = RecordingTransport::default();

    assert_eq!(
        dispatch(&ctx, &transport, &message(PATIENT, "/start")).await,
        Some(Handled::Greeted)
    );
    assert_eq!(
        dispatch(&ctx, &transport, &message(PATIENT, "/help")).await,
        Some(Handled::HelpShown)
    );
    assert_eq!(
        dispatch(&ctx, &transport, &message(PATIENT, "/teleport")).await,
        Some(Handled::UnknownCommand)
    );

    let texts = transport.texts_to(PATIENT).await;
    assert!(texts[0].starts_with("Hi Ada!"));
    assert!(texts[1].contains("/get_consultations"));
    assert_eq!(texts[2], replies::UNKNOWN_COMMAND);
    assert_eq!(ctx.store.count(), 0);
}
