//! KPI extraction: a deterministic pattern pass, an optional oracle pass and
//! the merge into one [`KpiRecord`](crate::kpi::KpiRecord) per message.

pub mod labels;
pub mod merge;
pub mod pattern;
pub mod values;

pub use labels::{LabelHit, LabelTable};
pub use merge::{DocumentExtraction, ExtractionOutcome, KpiExtractor, OracleStatus};
pub use pattern::PatternExtractor;
