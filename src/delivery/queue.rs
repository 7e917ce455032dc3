//! Unbounded FIFO between log producers and the delivery worker
//!
//! Producers never block: `push` is a plain channel send. The queue also keeps
//! a count of items that were pushed but not yet processed so callers can wait
//! for the worker to catch up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

use super::item::DeliveryItem;

/// Returned when the worker side of the queue is gone
#[derive(Debug, thiserror::Error)]
#[error("delivery queue is closed")]
pub struct QueueClosed(pub DeliveryItem);

#[derive(Debug, Default)]
struct Pending {
    count: AtomicUsize,
    drained: Notify,
}

impl Pending {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Producer handle for the delivery queue
#[derive(Clone, Debug)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryItem>,
    pending: Arc<Pending>,
}

/// Consumer half, owned by the worker
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::UnboundedReceiver<DeliveryItem>,
    pending: Arc<Pending>,
}

/// Create a queue and the receiver the worker drains
pub fn channel() -> (DeliveryQueue, DeliveryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(Pending::default());
    let queue = DeliveryQueue {
        tx,
        pending: Arc::clone(&pending),
    };
    (queue, DeliveryReceiver { rx, pending })
}

impl DeliveryReceiver {
    /// Wait for the next item; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<DeliveryItem> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<DeliveryItem, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Called once an item is delivered or dropped
    pub fn mark_processed(&self) {
        self.pending.finish();
    }
}

impl DeliveryQueue {
    /// Enqueue an item without blocking
    pub fn push(&self, item: DeliveryItem) -> Result<(), QueueClosed> {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(item)) = self.tx.send(item) {
            self.pending.finish();
            return Err(QueueClosed(item));
        }
        Ok(())
    }

    /// Number of items pushed but not yet processed by the worker
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until every pushed item has been processed
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.pending.drained.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_push_is_fifo() {
        let (queue, mut rx) = channel();

        queue.push(DeliveryItem::text("1")).unwrap();
        queue.push(DeliveryItem::text("2")).unwrap();
        queue.push(DeliveryItem::file(b"x".to_vec(), "f.txt", "c")).unwrap();

        assert_eq!(queue.pending(), 3);
        assert_eq!(rx.try_recv().unwrap(), DeliveryItem::text("1"));
        assert_eq!(rx.try_recv().unwrap(), DeliveryItem::text("2"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeliveryItem::FilePayload { .. }
        ));
    }

    #[test]
    fn test_push_after_receiver_dropped() {
        let (queue, rx) = channel();
        drop(rx);

        let err = queue.push(DeliveryItem::text("lost")).unwrap_err();
        assert_eq!(err.0, DeliveryItem::text("lost"));
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_wait_drained_returns_immediately_when_empty() {
        let (queue, _rx) = channel();
        tokio::time::timeout(Duration::from_millis(100), queue.wait_drained())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_drained_wakes_after_processing() {
        let (queue, mut rx) = channel();
        queue.push(DeliveryItem::text("a")).unwrap();
        queue.push(DeliveryItem::text("b")).unwrap();

        tokio::spawn(async move {
            while let Some(_item) = rx.recv().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
                rx.mark_processed();
            }
        });

        tokio::time::timeout(Duration::from_secs(1), queue.wait_drained())
            .await
            .unwrap();
        assert_eq!(queue.pending(), 0);
    }
}
