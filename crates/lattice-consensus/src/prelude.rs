//! Prelude module - commonly used types for convenient import.

pub use crate::agreement::{
    evaluate, mean_pairwise_jaccard, overall_agreement, pairwise_jaccard, record_agreement,
    ConsensusOutcome, ConsensusStrategy,
};
pub use crate::evidence::{validate_evidence, Citation, EvidenceError};
