pub mod candidate;
pub mod gate;

pub use candidate::{Candidate, CandidateScore, CandidateScorer, ScoreReason};
pub use gate::AttachmentGate;

/// Exact domain or one of its subdomains.
pub(crate) fn domain_listed(domain: &str, listed: &[String]) -> bool {
    !domain.is_empty()
        && listed.iter().any(|d| {
            domain == d
                || domain
                    .strip_suffix(d.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
}
