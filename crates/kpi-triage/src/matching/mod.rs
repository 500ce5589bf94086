pub mod source;

pub use source::{MatchOutcome, RuleScore, SourceMatch, SourceMatcher};
