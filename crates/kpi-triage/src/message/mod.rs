//! Immutable message model handed over by a mail source.

pub mod sender;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sender::{Sender, SenderResolution};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttachmentContent {
    /// Raw file bytes, decoded on demand.
    Bytes(Vec<u8>),
    /// Text a mail source already extracted.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub content: AttachmentContent,
}

impl Attachment {
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let media_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            filename,
            media_type,
            content: AttachmentContent::Bytes(bytes),
        }
    }

    pub fn from_text(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let filename = filename.into();
        let media_type = mime_guess::from_path(&filename)
            .first_or_text_plain()
            .essence_str()
            .to_string();
        Self {
            filename,
            media_type,
            content: AttachmentContent::Text(text.into()),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Lower-cased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }

    pub fn size(&self) -> usize {
        match &self.content {
            AttachmentContent::Bytes(b) => b.len(),
            AttachmentContent::Text(t) => t.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable per-item identifier; the ledger key.
    pub id: String,
    pub sender: Sender,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub folder: String,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        sender: Sender,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            subject: subject.into(),
            body: body.into(),
            received_at,
            attachments: Vec::new(),
            folder: "Inbox".to_string(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn attachment_names(&self) -> Vec<&str> {
        self.attachments.iter().map(|a| a.filename.as_str()).collect()
    }
}
