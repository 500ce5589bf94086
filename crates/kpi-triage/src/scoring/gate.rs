use regex::Regex;

use crate::error::ConfigError;
use crate::message::{Attachment, Message};
use crate::text::compile_patterns;

/// Drops inline images and signature logos before scoring and extraction.
pub struct AttachmentGate {
    noise: Vec<Regex>,
}

impl AttachmentGate {
    pub fn new(noise_patterns: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            noise: compile_patterns(noise_patterns, "scoring.noise_filename_patterns")?,
        })
    }

    pub fn is_noise(&self, attachment: &Attachment) -> bool {
        let name = attachment.filename.trim().to_lowercase();
        name.is_empty() || self.noise.iter().any(|re| re.is_match(&name))
    }

    pub fn relevant<'a>(&self, message: &'a Message) -> Vec<&'a Attachment> {
        message
            .attachments
            .iter()
            .filter(|a| !self.is_noise(a))
            .collect()
    }
}
