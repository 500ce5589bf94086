pub mod config;
pub mod context;
pub mod error;
pub mod manifest;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{PipelineContext, Stage};
pub use error::{FailureCategory, MessageIssue, PipelineError};
pub use manifest::{MessageOutcome, RunManifest, StageCounts};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{Collaborators, Pipeline};
