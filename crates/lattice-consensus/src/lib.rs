//! Lattice Consensus - Agreement across parallel candidate outputs.
//!
//! This crate provides:
//! - Jaccard agreement over case-folded token sets, with the
//!   `agreement_pct` histogram
//! - Merge strategies: union, quorum, two-phase
//! - Evidence validation: every `[i]` citation marker must be covered by a
//!   citation with index `i`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod agreement;
pub mod evidence;

pub use agreement::{
    evaluate, mean_pairwise_jaccard, overall_agreement, pairwise_jaccard, record_agreement,
    ConsensusOutcome, ConsensusStrategy,
};
pub use evidence::{validate_evidence, Citation, EvidenceError};
