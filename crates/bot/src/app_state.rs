use std::sync::Arc;

use intake::{dispatch, Handled, IntakeContext};
use shared::{protocol::Update, transport::ChatTransport};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) ctx: IntakeContext,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) webhook_secret: Option<String>,
    serial: Arc<Mutex<()>>,
}

impl AppState {
    pub(crate) fn new(
        ctx: IntakeContext,
        transport: Arc<dyn ChatTransport>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            ctx,
            transport,
            webhook_secret,
            serial: Arc::default(),
        }
    }

    /// Runs one update through the intake flow. Updates are handled one at a
    /// time so appends to the record file never interleave.
    pub(crate) async fn process_update(&self, update: &Update) -> Option<Handled> {
        let Some(inbound) = update.inbound() else {
            debug!(update_id = update.update_id, "skipping update without text");
            return None;
        };

        let _guard = self.serial.lock().await;
        info!(
            update_id = update.update_id,
            chat_id = %inbound.chat_id,
            "handling message"
        );
        dispatch(&self.ctx, self.transport.as_ref(), &inbound).await
    }
}
