//! Delivery of log messages to the operator chat
//!
//! Producers push [`DeliveryItem`]s into an unbounded [`DeliveryQueue`]; a
//! single supervised [`Worker`] sends them in order with rate limiting and
//! bounded retries. [`LogPipeline`] owns and wires the pieces.

mod item;
mod pipeline;
pub mod queue;
mod retry;
mod worker;

pub use item::DeliveryItem;
pub use pipeline::LogPipeline;
pub use queue::{DeliveryQueue, DeliveryReceiver, QueueClosed};
pub use retry::{Backoff, RetryPolicy};
pub use worker::{Disposition, Worker};

/// Target for diagnostics of the delivery path itself
///
/// Events on this target are never forwarded to the chat.
pub const LOCAL_TARGET: &str = "schedule_bot::delivery";
