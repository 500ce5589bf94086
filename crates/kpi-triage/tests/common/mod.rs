//! Shared test utilities for kpi-triage integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a temp ledger and fallback file
//! - Scripted collaborators (oracle, sink, triage classifier, text recovery)
//! - Builders for configurations, messages and workbook attachments

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
