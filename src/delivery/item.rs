//! Outbound items waiting for the delivery worker

/// Something the worker sends to the log chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryItem {
    /// Plain text message, already split to fit the chat limit
    TextChunk { body: String },
    /// Document upload with a caption
    FilePayload {
        bytes: Vec<u8>,
        filename: String,
        caption: String,
    },
}

impl DeliveryItem {
    pub fn text(body: impl Into<String>) -> Self {
        DeliveryItem::TextChunk { body: body.into() }
    }

    pub fn file(bytes: Vec<u8>, filename: impl Into<String>, caption: impl Into<String>) -> Self {
        DeliveryItem::FilePayload {
            bytes,
            filename: filename.into(),
            caption: caption.into(),
        }
    }

    /// Short description for local diagnostics
    pub fn describe(&self) -> String {
        match self {
            DeliveryItem::TextChunk { body } => {
                format!("text message ({} chars)", body.chars().count())
            }
            DeliveryItem::FilePayload {
                bytes, filename, ..
            } => format!("file {} ({} bytes)", filename, bytes.len()),
        }
    }
}
