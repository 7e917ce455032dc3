//! Owner of the log forwarding pipeline
//!
//! Wires buffer, queue, sink and worker together. The worker is started
//! explicitly with [`LogPipeline::start`] and runs under a supervisor that
//! restarts it if it panics, so a single bad item cannot silently stop all
//! future deliveries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::queue::{self, DeliveryQueue};
use super::retry::RetryPolicy;
use super::worker::Worker;
use super::LOCAL_TARGET;
use crate::config::DeliveryConfig;
use crate::logging::{ChatLogLayer, Formatter, LogBuffer, LogSink};
use crate::notify::Notifier;
use crate::transport::ChatTransport;

/// Pause before a panicked worker is restarted
const RESTART_DELAY: Duration = Duration::from_secs(1);

pub struct LogPipeline {
    config: DeliveryConfig,
    transport: Arc<dyn ChatTransport>,
    queue: DeliveryQueue,
    sink: Arc<LogSink>,
    worker: Arc<Worker>,
    started: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl LogPipeline {
    pub fn new(
        config: DeliveryConfig,
        transport: Arc<dyn ChatTransport>,
        formatter: Arc<dyn Formatter>,
    ) -> Self {
        let buffer = Arc::new(LogBuffer::new(config.buffer_capacity));
        let (queue, rx) = queue::channel();
        let sink = Arc::new(LogSink::new(buffer, queue.clone(), formatter, &config));
        let worker = Arc::new(Worker::new(
            Arc::clone(&transport),
            config.chat_id,
            rx,
            RetryPolicy::worker(&config),
            config.rate_limit(),
        ));

        Self {
            config,
            transport,
            queue,
            sink,
            worker,
            started: AtomicBool::new(false),
            supervisor: Mutex::new(None),
        }
    }

    /// Launch the delivery worker; only the first call has an effect
    ///
    /// Must be called from within a tokio runtime. Returns `true` if this call
    /// started the worker.
    pub fn start(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(target: LOCAL_TARGET, "Cannot start log delivery outside a tokio runtime");
            return false;
        };

        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let handle = runtime.spawn(supervise(Arc::clone(&self.worker)));
        if let Ok(mut supervisor) = self.supervisor.lock() {
            *supervisor = Some(handle);
        }
        debug!(target: LOCAL_TARGET, chat_id = self.config.chat_id, "Log delivery started");
        true
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn sink(&self) -> Arc<LogSink> {
        Arc::clone(&self.sink)
    }

    /// `tracing` layer feeding this pipeline
    pub fn layer(&self) -> ChatLogLayer {
        ChatLogLayer::new(self.sink())
    }

    /// Direct notifier sharing this pipeline's transport and chat
    pub fn notifier(&self) -> Notifier {
        Notifier::new(Arc::clone(&self.transport), self.config.clone())
    }

    pub fn buffer(&self) -> Arc<LogBuffer> {
        Arc::clone(self.sink.buffer())
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Wait until all queued items are processed; `false` on timeout
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.queue.wait_drained())
            .await
            .is_ok()
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        let supervisor = match self.supervisor.get_mut() {
            Ok(supervisor) => supervisor.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = supervisor {
            handle.abort();
        }
    }
}

/// Aborts the wrapped task when dropped
struct WorkerTask(JoinHandle<()>);

impl Drop for WorkerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the worker, restarting it after a panic
///
/// Cancelling the supervisor cancels the running worker as well.
async fn supervise(worker: Arc<Worker>) {
    loop {
        let mut task = WorkerTask(tokio::spawn(Arc::clone(&worker).run()));
        match (&mut task.0).await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                let lost = worker.recover_after_panic().await;
                error!(
                    target: LOCAL_TARGET,
                    lost_item = lost,
                    "Log delivery worker panicked, restarting"
                );
                tokio::time::sleep(RESTART_DELAY).await;
            }
            Err(_) => {
                debug!(target: LOCAL_TARGET, "Log delivery worker cancelled");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryItem;
    use crate::logging::{DefaultFormatter, LogRecord, Severity};
    use crate::transport::mock::{ScriptedTransport, Sent};
    use crate::transport::SendOutcome;

    fn pipeline(transport: Arc<ScriptedTransport>, min_severity: Severity) -> LogPipeline {
        let config = DeliveryConfig {
            chat_id: -7,
            min_severity,
            buffer_capacity: 3,
            ..DeliveryConfig::default()
        };
        LogPipeline::new(config, transport, Arc::new(DefaultFormatter))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let pipeline = pipeline(Arc::clone(&transport), Severity::Info);

        assert!(pipeline.start());
        assert!(!pipeline.start());
        assert!(!pipeline.start());
        assert!(pipeline.is_started());

        pipeline.queue().push(DeliveryItem::text("one")).unwrap();
        pipeline.queue().push(DeliveryItem::text("two")).unwrap();
        assert!(pipeline.drain(Duration::from_secs(60)).await);

        // Give a hypothetical second worker time to double-send
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            transport.sent(),
            vec![Sent::Text("one".to_string()), Sent::Text("two".to_string())]
        );
    }

    #[test]
    fn test_start_outside_runtime_is_refused() {
        let pipeline = pipeline(Arc::new(ScriptedTransport::always_ok()), Severity::Info);
        assert!(!pipeline.start());
        assert!(!pipeline.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_to_chat_end_to_end() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let pipeline = pipeline(Arc::clone(&transport), Severity::Warning);
        pipeline.start();

        let sink = pipeline.sink();
        for line in ["a", "b", "c", "d"] {
            sink.emit(&LogRecord::new(Severity::Info, "bot", line));
        }
        sink.emit(&LogRecord::new(Severity::Warning, "bot", "boom"));
        assert!(pipeline.drain(Duration::from_secs(60)).await);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let Sent::Document {
            filename, bytes, ..
        } = &sent[0]
        else {
            panic!("expected a document");
        };
        let body = String::from_utf8(bytes.clone()).unwrap();
        assert!(body.starts_with("=== RECENT LOGS (3 entries) ==="));
        assert!(!body.contains("bot: a\n"));
        let order: Vec<usize> = ["bot: b", "bot: c", "bot: d", "bot: boom"]
            .iter()
            .map(|needle| body.find(needle).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(filename.starts_with("warning_") && filename.ends_with(".txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_restarts_after_panic() {
        let transport = Arc::new(ScriptedTransport::new(|sent, previous| {
            if *sent == Sent::Text("poison".to_string()) && previous == 0 {
                panic!("transport bug");
            }
            SendOutcome::Delivered
        }));
        let pipeline = pipeline(Arc::clone(&transport), Severity::Info);
        pipeline.start();

        pipeline.queue().push(DeliveryItem::text("poison")).unwrap();
        pipeline.queue().push(DeliveryItem::text("after")).unwrap();

        assert!(pipeline.drain(Duration::from_secs(60)).await);
        assert_eq!(
            transport.sent(),
            vec![
                Sent::Text("poison".to_string()),
                Sent::Text("after".to_string())
            ]
        );
        assert_eq!(pipeline.queue().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_worker() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let pipeline = pipeline(Arc::clone(&transport), Severity::Info);
        pipeline.start();
        let queue = pipeline.queue().clone();

        drop(pipeline);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(queue.is_closed());
        assert!(queue.push(DeliveryItem::text("too late")).is_err());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_shares_transport_and_chat() {
        let transport = Arc::new(ScriptedTransport::always_ok());
        let pipeline = pipeline(Arc::clone(&transport), Severity::Warning);

        assert!(pipeline.notifier().notify("Bot started").await);

        let calls = transport.calls();
        assert_eq!(calls[0].chat_id, -7);
        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.queue().pending(), 0);
    }
}
