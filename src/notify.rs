//! Direct informational messages to the log chat
//!
//! Used for operator-facing notices such as "bot started" or "sync finished".
//! These bypass the log queue and are sent immediately, so they are not
//! ordered relative to queued log messages.

use std::sync::Arc;

use chrono::Local;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::DeliveryConfig;
use crate::delivery::{RetryPolicy, LOCAL_TARGET};
use crate::transport::{ChatId, ChatTransport, SendOutcome};

/// Default attempts for [`Notifier::notify`]
pub const DEFAULT_NOTIFY_RETRIES: u32 = 3;

/// Sends one-off messages with flood-control aware retries
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
    chat_id: ChatId,
    config: DeliveryConfig,
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChatTransport>, config: DeliveryConfig) -> Self {
        Self {
            transport,
            chat_id: config.chat_id,
            config,
        }
    }

    /// Send `text` with the default number of attempts
    pub async fn notify(&self, text: &str) -> bool {
        self.notify_with_retries(text, DEFAULT_NOTIFY_RETRIES).await
    }

    /// Send `text` as an INFO line; returns whether it was delivered
    pub async fn notify_with_retries(&self, text: &str, max_retries: u32) -> bool {
        let policy = RetryPolicy::notifier(&self.config, max_retries);
        let message = format!(
            "{} [INFO] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            text
        );

        for attempt in 1..=policy.max_attempts {
            match self.transport.send_text(self.chat_id, &message).await {
                SendOutcome::Delivered => return true,
                SendOutcome::RetryAfter(retry_after) => {
                    if attempt < policy.max_attempts {
                        let wait = policy.flood_delay(retry_after);
                        info!(
                            target: LOCAL_TARGET,
                            "Flood control while sending notification, waiting {}s (attempt {}/{})",
                            wait.as_secs(),
                            attempt,
                            policy.max_attempts
                        );
                        sleep(wait).await;
                    }
                }
                SendOutcome::Permanent(reason) => {
                    warn!(target: LOCAL_TARGET, reason = %reason, "Notification cannot be delivered");
                    break;
                }
                SendOutcome::Transient(reason) => {
                    if attempt < policy.max_attempts {
                        let wait = policy.backoff_delay(attempt);
                        info!(
                            target: LOCAL_TARGET,
                            reason = %reason,
                            "Failed to send notification (attempt {}/{}), retrying in {}s",
                            attempt,
                            policy.max_attempts,
                            wait.as_secs()
                        );
                        sleep(wait).await;
                    }
                }
            }
        }

        error!(target: LOCAL_TARGET, "Giving up on notification: {}", text);
        false
    }
}
