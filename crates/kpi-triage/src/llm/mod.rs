//! OpenAI-compatible chat-completions client shared by the extraction oracle
//! and the quarantine classifier.

pub mod client;
pub mod json;

pub use client::{ChatClient, ChatMessage};
pub use json::parse_json_object;
