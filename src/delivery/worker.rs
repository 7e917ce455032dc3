//! Sequential delivery loop
//!
//! A single worker drains the queue in order. Each item gets a bounded number
//! of attempts; flood-control responses are honoured with the server supplied
//! wait, other failures back off linearly. A fixed pause follows every item so
//! the log chat is never flooded, no matter how fast producers are.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::item::DeliveryItem;
use super::queue::DeliveryReceiver;
use super::retry::RetryPolicy;
use super::LOCAL_TARGET;
use crate::transport::{ChatId, ChatTransport, SendOutcome};

/// Final state of one queued item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Delivered { attempts: u32 },
    Dropped { attempts: u32, reason: String },
}

pub struct Worker {
    transport: Arc<dyn ChatTransport>,
    chat_id: ChatId,
    rx: Mutex<DeliveryReceiver>,
    policy: RetryPolicy,
    rate_limit: Duration,
    /// Set while an item has been received but not yet marked processed
    in_flight: AtomicBool,
}

impl Worker {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        chat_id: ChatId,
        rx: DeliveryReceiver,
        policy: RetryPolicy,
        rate_limit: Duration,
    ) -> Self {
        Self {
            transport,
            chat_id,
            rx: Mutex::new(rx),
            policy,
            rate_limit,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Process items until every producer is gone
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.rx.lock().await;

        while let Some(item) = rx.recv().await {
            self.in_flight.store(true, Ordering::SeqCst);

            match self.deliver(&item).await {
                Disposition::Delivered { attempts } => {
                    debug!(target: LOCAL_TARGET, attempts, "Delivered {}", item.describe());
                }
                Disposition::Dropped { attempts, reason } => {
                    error!(
                        target: LOCAL_TARGET,
                        attempts,
                        reason = %reason,
                        "Dropping {} after failed delivery",
                        item.describe()
                    );
                }
            }

            sleep(self.rate_limit).await;

            if self.in_flight.swap(false, Ordering::SeqCst) {
                rx.mark_processed();
            }
        }

        debug!(target: LOCAL_TARGET, "Delivery queue closed, worker stopping");
    }

    /// Try to send one item within the retry budget
    pub async fn deliver(&self, item: &DeliveryItem) -> Disposition {
        let max_attempts = self.policy.max_attempts;
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            let (wait, reason) = match self.send(item).await {
                SendOutcome::Delivered => return Disposition::Delivered { attempts: attempt },
                SendOutcome::Permanent(reason) => {
                    return Disposition::Dropped {
                        attempts: attempt,
                        reason,
                    }
                }
                SendOutcome::RetryAfter(retry_after) => (
                    self.policy.flood_delay(retry_after),
                    format!("flood control (retry after {}s)", retry_after.as_secs()),
                ),
                SendOutcome::Transient(reason) => (self.policy.backoff_delay(attempt), reason),
            };

            if attempt < max_attempts {
                warn!(
                    target: LOCAL_TARGET,
                    reason = %reason,
                    "Failed to send log (attempt {}/{}), retrying in {}s",
                    attempt,
                    max_attempts,
                    wait.as_secs()
                );
                sleep(wait).await;
            }
            last_failure = reason;
        }

        Disposition::Dropped {
            attempts: max_attempts,
            reason: last_failure,
        }
    }

    async fn send(&self, item: &DeliveryItem) -> SendOutcome {
        match item {
            DeliveryItem::TextChunk { body } => self.transport.send_text(self.chat_id, body).await,
            DeliveryItem::FilePayload {
                bytes,
                filename,
                caption,
            } => {
                self.transport
                    .send_document(self.chat_id, bytes, filename, caption)
                    .await
            }
        }
    }

    /// Account for an item lost to a panic; returns whether one was in flight
    pub(crate) async fn recover_after_panic(&self) -> bool {
        let lost = self.in_flight.swap(false, Ordering::SeqCst);
        if lost {
            self.rx.lock().await.mark_processed();
        }
        lost
    }
}
