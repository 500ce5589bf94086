use std::time::Duration;

use crate::config::{fingerprint, TriageConfig};

pub struct PipelineConfig {
    pub folders: Vec<String>,
    pub lookback_days: u32,
    pub concurrency: usize,
    pub recovery_timeout: Duration,
    pub extractor_version: String,
    pub config_version: String,
    pub config_fingerprint: String,
}

impl PipelineConfig {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            folders: config.run.folders.clone(),
            lookback_days: config.run.lookback_days,
            concurrency: config.run.concurrency.max(1),
            recovery_timeout: Duration::from_secs(config.recovery.timeout_secs),
            extractor_version: config.extraction.extractor_version.clone(),
            config_version: config.version.clone(),
            config_fingerprint: fingerprint(config),
        }
    }
}
