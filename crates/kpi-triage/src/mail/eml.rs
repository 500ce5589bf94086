//! File-backed mail source: `<root>/<folder>/**/*.eml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use mail_parser::{MessageParser, MimeHeaders};

use crate::config::schema::MailConfig;
use crate::message::{Attachment, Message, Sender};
use crate::sanitize::redact_path;

use super::{sort_messages, FetchWindow, MailBatch, MailError, MailSource, SkippedItem};

pub struct EmlDirectorySource {
    root: PathBuf,
    directory: BTreeMap<String, String>,
}

impl EmlDirectorySource {
    /// `directory` maps lower-cased directory aliases to SMTP addresses.
    pub fn new(root: impl Into<PathBuf>, directory: BTreeMap<String, String>) -> Self {
        Self {
            root: root.into(),
            directory,
        }
    }

    /// The configured `.eml` directory, if any.
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        config
            .eml_directory
            .as_ref()
            .map(|root| Self::new(root, config.sender_directory.clone()))
    }

    fn scan(&self, window: &FetchWindow, folders: &[String]) -> Result<MailBatch, MailError> {
        if !self.root.is_dir() {
            return Err(MailError::MissingDirectory(self.root.clone()));
        }
        let mut batch = MailBatch::default();
        for folder in self.folder_names(folders)? {
            let pattern = format!(
                "{}/{}/**/*.eml",
                glob::Pattern::escape(&self.root.to_string_lossy()),
                glob::Pattern::escape(&folder)
            );
            let paths = glob::glob(&pattern).map_err(|e| MailError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        batch.skipped.push(SkippedItem {
                            item: redact_path(e.path()),
                            reason: e.error().to_string(),
                        });
                        continue;
                    }
                };
                match self.read_message(&path, &folder) {
                    Ok(message) if window.contains(message.received_at) => {
                        batch.messages.push(message)
                    }
                    Ok(message) => debug!("Skipping {} outside the fetch window", message.id),
                    Err(reason) => {
                        warn!("Skipping unreadable mail file {}: {}", redact_path(&path), reason);
                        batch.skipped.push(SkippedItem {
                            item: redact_path(&path),
                            reason,
                        });
                    }
                }
            }
        }
        sort_messages(&mut batch.messages);
        Ok(batch)
    }

    /// Folder names to scan. An empty request scans every sub-directory.
    fn folder_names(&self, folders: &[String]) -> Result<Vec<String>, MailError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| MailError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| {
                folders.is_empty() || folders.iter().any(|f| f.eq_ignore_ascii_case(name))
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_message(&self, path: &Path, folder: &str) -> Result<Message, String> {
        let raw = std::fs::read(path).map_err(|e| e.to_string())?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err("empty file".to_string());
        }
        let parsed = MessageParser::default()
            .parse(&raw)
            .ok_or_else(|| "not a parseable RFC 5322 message".to_string())?;

        let id = parsed
            .message_id()
            .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_id(folder, path));

        let (raw_from, display_name) = parsed
            .from()
            .and_then(|a| a.first())
            .map(|addr| {
                let name = addr.name().map(str::to_string);
                let raw = addr
                    .address()
                    .filter(|a| !a.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| name.clone())
                    .unwrap_or_default();
                (raw, name)
            })
            .unwrap_or_default();
        let sender = Sender::resolve(&raw_from, display_name.as_deref(), &self.directory);
        if !sender.is_resolved() {
            warn!("Unresolved sender identifier on {}", redact_path(path));
        }

        let received_at = match parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        {
            Some(at) => at,
            None => {
                warn!(
                    "Unparseable date on {}; using the file modification time",
                    redact_path(path)
                );
                modified_at(path)?
            }
        };

        let subject = parsed.subject().unwrap_or_default().to_string();
        let body = parsed
            .body_text(0)
            .map(|b| b.into_owned())
            .unwrap_or_default();

        let mut message = Message::new(id, sender, subject, body, received_at).with_folder(folder);
        for (i, part) in parsed.attachments().enumerate() {
            let filename = part
                .attachment_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{}", i + 1));
            let mut attachment = Attachment::from_bytes(filename, part.contents().to_vec());
            if let Some(ct) = part.content_type() {
                if let Some(subtype) = ct.subtype() {
                    attachment = attachment.with_media_type(format!("{}/{}", ct.ctype(), subtype));
                }
            }
            message = message.with_attachment(attachment);
        }
        Ok(message)
    }
}

fn fallback_id(folder: &str, path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("message");
    format!("{}/{}", folder, stem)
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>, String> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|e| format!("no usable date: {}", e))
}

#[async_trait]
impl MailSource for EmlDirectorySource {
    async fn fetch(&self, window: &FetchWindow, folders: &[String]) -> Result<MailBatch, MailError> {
        let source = EmlDirectorySource {
            root: self.root.clone(),
            directory: self.directory.clone(),
        };
        let window = *window;
        let folders = folders.to_vec();
        tokio::task::spawn_blocking(move || source.scan(&window, &folders))
            .await
            .map_err(|e| MailError::Unavailable(e.to_string()))?
    }
}
