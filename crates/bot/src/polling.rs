use std::time::Duration;

use telegram::{BotClient, Poller};
use tracing::{info, warn};

use crate::app_state::AppState;

pub(crate) const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls for updates until the task is cancelled.
pub(crate) async fn run(
    state: AppState,
    client: &BotClient,
    mut poller: Poller,
) -> anyhow::Result<()> {
    // updates are not delivered through getUpdates while a webhook is set
    if let Err(error) = client.delete_webhook().await {
        warn!(%error, "failed to clear webhook before polling");
    }
    info!("polling for updates");

    loop {
        match poller.next_batch().await {
            Ok(updates) => {
                for update in &updates {
                    state.process_update(update).await;
                }
            }
            Err(error) => {
                let delay = error.retry_after().unwrap_or(ERROR_BACKOFF);
                warn!(%error, delay_secs = delay.as_secs(), "polling failed; backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/polling_tests.rs"]
mod tests;
