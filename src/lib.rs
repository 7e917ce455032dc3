//! Schedule bot log delivery
//!
//! Forwards application logs to an operator Telegram chat: warnings and errors
//! arrive as text attachments with recent history, everything is rate limited
//! and retried in the background.

pub mod config;
pub mod delivery;
pub mod logging;
pub mod notify;
pub mod relay;
pub mod transport;
