pub mod defaults;
pub mod loader;
pub mod schema;

pub use loader::{
    fingerprint, load_config, load_config_from_str, load_line_list, prepare_config, ConfigFormat,
};
pub use schema::{
    DomainPolicy, EntityRules, ExtractionConfig, LabelConfig, LlmEndpoint, MatchingConfig,
    OracleConfig, RecoveryConfig, ScoringConfig, SignalWeights, SinkConfig, SourceRule,
    SuitabilityConfig, TriageConfig, TriageSettings, UnmatchedPolicy, ValidationConfig,
};
