//! Chat transport used to deliver log messages
//!
//! The pipeline only needs two calls from the chat platform: send a text
//! message and upload a document. Each call reports a [`SendOutcome`] that
//! the retry loops switch on.

pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;

pub use telegram::TelegramTransport;

/// Identifier of the chat that receives log messages
pub type ChatId = i64;

/// Result of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Flood control: the server asked us to wait before trying again
    RetryAfter(Duration),
    /// Any failure that may succeed on a later attempt
    Transient(String),
    /// Failure that no retry can fix (wrong chat, revoked token, ...)
    Permanent(String),
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> SendOutcome;

    async fn send_document(
        &self,
        chat_id: ChatId,
        bytes: &[u8],
        filename: &str,
        caption: &str,
    ) -> SendOutcome;
}
