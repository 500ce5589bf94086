//! Suitability tiering of documents, including the text-recovery round trip
//! that a Tier 3 verdict requires before it can become terminal.

pub mod classifier;
pub mod signals;

use std::time::Duration;

use chrono::NaiveDate;

use crate::document::Document;
use crate::recovery::{recover_with_timeout, RecoveryOutcome, TextRecovery};

pub use classifier::{SuitabilityClassifier, SuitabilityVerdict, Tier};

/// A document together with its final verdict.
#[derive(Debug, Clone)]
pub struct AssessedDocument {
    pub document: Document,
    pub verdict: SuitabilityVerdict,
    /// Set when Tier 3 was degraded because recovery was unavailable.
    pub recovery_unavailable: Option<String>,
}

/// Classifies `document`, sending Tier 3 through text recovery and re-scoring
/// the recovered text. Tier 3 never survives this call.
pub async fn assess_document(
    classifier: &SuitabilityClassifier,
    recovery: &dyn TextRecovery,
    recovery_timeout: Duration,
    document: Document,
    as_of: NaiveDate,
) -> AssessedDocument {
    let verdict = classifier.classify(&document, as_of);
    if verdict.tier != Tier::Three {
        return AssessedDocument {
            document,
            verdict,
            recovery_unavailable: None,
        };
    }

    match recover_with_timeout(recovery, &document, recovery_timeout).await {
        RecoveryOutcome::Recovered(text) => {
            let recovered = document.with_recovered_text(text);
            let mut rescored = classifier.classify(&recovered, as_of);
            rescored.reasons.insert(0, "text recovered".to_string());
            if rescored.tier == Tier::Three {
                rescored.tier = Tier::Four;
                rescored.reasons.push("tier4: still unreadable after recovery".to_string());
            }
            rescored.required_ocr = true;
            tracing::debug!(
                document = %rescored.document,
                tier = %rescored.tier,
                score = rescored.score,
                "Re-scored recovered text"
            );
            AssessedDocument {
                document: recovered,
                verdict: rescored,
                recovery_unavailable: None,
            }
        }
        RecoveryOutcome::Unavailable(reason) => {
            tracing::warn!(document = %verdict.document, %reason, "Text recovery unavailable");
            let mut verdict = verdict;
            verdict.tier = Tier::Four;
            verdict.required_ocr = true;
            verdict
                .reasons
                .push(format!("text_recovery_unavailable: {}", reason));
            AssessedDocument {
                document,
                verdict,
                recovery_unavailable: Some(reason),
            }
        }
    }
}
