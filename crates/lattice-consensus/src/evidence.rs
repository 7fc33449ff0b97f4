//! Evidence validation.
//!
//! Every citation marker `[i]` in a final text must be covered by a
//! provided citation with index `i`. Uncovered markers fail validation and
//! are counted in `evidence_fail_total`.

use lattice_telemetry::MetricsRegistry;
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

/// One supplied citation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Citation {
    /// Marker index this citation covers.
    pub index: u32,
    /// Source locator (URL, document id).
    pub source: String,
}

/// Evidence failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvidenceError {
    /// Markers without a covering citation.
    #[error("uncovered citation markers: {0:?}")]
    UncoveredMarkers(Vec<u32>),
}

/// Validate that every `[i]` marker in `text` has a citation with index
/// `i`. Failures bump `evidence_fail_total`.
pub fn validate_evidence(
    text: &str,
    citations: &[Citation],
    metrics: &MetricsRegistry,
) -> Result<(), EvidenceError> {
    // Static pattern; compilation cannot fail.
    let marker = Regex::new(r"\[(\d+)\]").unwrap_or_else(|_| unreachable!());
    let provided: BTreeSet<u32> = citations.iter().map(|c| c.index).collect();
    let mut uncovered: Vec<u32> = marker
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse::<u32>().ok())
        .filter(|idx| !provided.contains(idx))
        .collect();
    uncovered.sort_unstable();
    uncovered.dedup();

    if uncovered.is_empty() {
        Ok(())
    } else {
        metrics.counter("evidence_fail_total").inc();
        Err(EvidenceError::UncoveredMarkers(uncovered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(index: u32) -> Citation {
        Citation {
            index,
            source: format!("doc-{index}"),
        }
    }

    #[test]
    fn test_covered_markers_pass() {
        let metrics = MetricsRegistry::new();
        let result = validate_evidence(
            "Claim A [1] and claim B [2].",
            &[citation(1), citation(2)],
            &metrics,
        );
        assert!(result.is_ok());
        assert_eq!(metrics.counter_value("evidence_fail_total"), 0);
    }

    #[test]
    fn test_uncovered_marker_fails_and_counts() {
        let metrics = MetricsRegistry::new();
        let result = validate_evidence("Claim [1] and [3].", &[citation(1)], &metrics);
        assert_eq!(result, Err(EvidenceError::UncoveredMarkers(vec![3])));
        assert_eq!(metrics.counter_value("evidence_fail_total"), 1);
    }

    #[test]
    fn test_no_markers_is_fine() {
        let metrics = MetricsRegistry::new();
        assert!(validate_evidence("No citations here.", &[], &metrics).is_ok());
    }

    #[test]
    fn test_repeated_marker_reported_once() {
        let metrics = MetricsRegistry::new();
        let result = validate_evidence("See [4], again [4].", &[], &metrics);
        assert_eq!(result, Err(EvidenceError::UncoveredMarkers(vec![4])));
    }
}
