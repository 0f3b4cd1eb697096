use std::time::Duration;

use shared::protocol::Update;

use crate::{BotClient, BotError};

/// Pull-mode update source. Tracks the `getUpdates` offset so each update
/// is handed out once.
#[derive(Debug)]
pub struct Poller {
    client: BotClient,
    offset: Option<i64>,
    timeout: Duration,
}

impl Poller {
    pub fn new(client: BotClient, timeout: Duration) -> Self {
        Self {
            client,
            offset: None,
            timeout,
        }
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Waits up to the long-poll timeout for the next batch. The batch is
    /// confirmed to the server on the following call.
    pub async fn next_batch(&mut self) -> Result<Vec<Update>, BotError> {
        let updates = self.client.get_updates(self.offset, self.timeout).await?;
        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            self.offset = Some(last + 1);
        }
        Ok(updates)
    }
}
