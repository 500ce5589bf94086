//! Mail source boundary: yields the finite message batch for one run.

pub mod eml;
pub mod error;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::message::Message;

pub use eml::EmlDirectorySource;
pub use error::MailError;

/// Half-open time window `[since, until)` on `received_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    /// Window covering the last `days` days up to `now`.
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            since: now - chrono::Duration::days(i64::from(days)),
            until: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at < self.until
    }
}

/// An item the source could not turn into a message.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MailBatch {
    /// Ordered by `received_at`, ties broken by id.
    pub messages: Vec<Message>,
    pub skipped: Vec<SkippedItem>,
}

#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch(&self, window: &FetchWindow, folders: &[String]) -> Result<MailBatch, MailError>;
}

fn folder_selected(folders: &[String], folder: &str) -> bool {
    folders.is_empty() || folders.iter().any(|f| f.eq_ignore_ascii_case(folder))
}

pub(crate) fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Source over messages already held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryMailSource {
    messages: Vec<Message>,
}

impl MemoryMailSource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

#[async_trait]
impl MailSource for MemoryMailSource {
    async fn fetch(&self, window: &FetchWindow, folders: &[String]) -> Result<MailBatch, MailError> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| window.contains(m.received_at) && folder_selected(folders, &m.folder))
            .cloned()
            .collect();
        sort_messages(&mut messages);
        Ok(MailBatch {
            messages,
            skipped: Vec::new(),
        })
    }
}
