//! Jaccard agreement and merge strategies.

use lattice_telemetry::MetricsRegistry;
use std::collections::HashSet;
use tracing::debug;

/// Bucket bounds of the `agreement_pct` histogram.
pub const AGREEMENT_BUCKETS: [f64; 5] = [0.2, 0.4, 0.6, 0.8, 0.9];

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity of two texts over case-folded token sets.
#[must_use]
pub fn pairwise_jaccard(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Mean pairwise Jaccard of one text against all others.
#[must_use]
pub fn mean_pairwise_jaccard(texts: &[String], index: usize) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, other) in texts.iter().enumerate() {
        if i != index {
            sum += pairwise_jaccard(&texts[index], other);
            count += 1;
        }
    }
    sum / count as f64
}

/// Overall agreement of a candidate set: mean over all pairs.
#[must_use]
pub fn overall_agreement(texts: &[String]) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            sum += pairwise_jaccard(&texts[i], &texts[j]);
            count += 1;
        }
    }
    sum / count as f64
}

/// Record an agreement observation into `agreement_pct`.
pub fn record_agreement(metrics: &MetricsRegistry, agreement: f64) {
    metrics
        .histogram("agreement_pct", &AGREEMENT_BUCKETS)
        .observe(agreement);
}

/// How parallel candidate outputs are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// Concatenate unique answers.
    Union,
    /// At least `k` byte-identical answers required.
    Quorum(usize),
    /// Pick the text with highest mean pairwise Jaccard; require the mean
    /// to reach the threshold (per-mille to stay `Eq`-friendly).
    TwoPhase {
        /// Required mean pairwise agreement, in per-mille.
        threshold_pm: u32,
    },
}

/// Result of a consensus evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusOutcome {
    /// A text was accepted.
    Accepted {
        /// The merged/selected text.
        text: String,
        /// Agreement level backing the acceptance.
        agreement: f64,
    },
    /// No consensus; escalation or failure follows.
    NoConsensus {
        /// Agreement level observed.
        agreement: f64,
    },
}

impl ConsensusOutcome {
    /// Whether a text was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Evaluate a strategy over candidate texts.
#[must_use]
pub fn evaluate(strategy: ConsensusStrategy, texts: &[String]) -> ConsensusOutcome {
    let agreement = overall_agreement(texts);
    let outcome = match strategy {
        ConsensusStrategy::Union => {
            let mut seen = HashSet::new();
            let merged: Vec<&str> = texts
                .iter()
                .filter(|t| seen.insert(t.trim().to_string()))
                .map(String::as_str)
                .collect();
            ConsensusOutcome::Accepted {
                text: merged.join("\n"),
                agreement,
            }
        },
        ConsensusStrategy::Quorum(k) => {
            let mut counts: std::collections::HashMap<&str, usize> =
                std::collections::HashMap::new();
            for text in texts {
                *counts.entry(text.trim()).or_default() += 1;
            }
            match counts.into_iter().find(|(_, n)| *n >= k) {
                Some((text, _)) => ConsensusOutcome::Accepted {
                    text: text.to_string(),
                    agreement,
                },
                None => ConsensusOutcome::NoConsensus { agreement },
            }
        },
        ConsensusStrategy::TwoPhase { threshold_pm } => {
            let threshold = f64::from(threshold_pm) / 1000.0;
            let best = (0..texts.len())
                .map(|i| (mean_pairwise_jaccard(texts, i), i))
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            match best {
                Some((mean, idx)) if mean >= threshold => ConsensusOutcome::Accepted {
                    text: texts[idx].clone(),
                    agreement: mean,
                },
                Some((mean, _)) => ConsensusOutcome::NoConsensus { agreement: mean },
                None => ConsensusOutcome::NoConsensus { agreement: 0.0 },
            }
        },
    };
    debug!(?strategy, agreement, accepted = outcome.is_accepted(), "consensus evaluated");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert!((pairwise_jaccard("a b c", "A B C") - 1.0).abs() < 1e-9);
        assert!((pairwise_jaccard("a b", "x y") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        // {a,b,c} vs {b,c,d}: 2 shared of 4 total.
        assert!((pairwise_jaccard("a b c", "b c d") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_union_accepts_and_dedups() {
        let texts = vec!["same answer".to_string(), "same answer".to_string()];
        let outcome = evaluate(ConsensusStrategy::Union, &texts);
        match outcome {
            ConsensusOutcome::Accepted { text, .. } => assert_eq!(text, "same answer"),
            ConsensusOutcome::NoConsensus { .. } => panic!("union always accepts"),
        }
    }

    #[test]
    fn test_quorum_requires_k_identical() {
        let texts = vec![
            "answer one".to_string(),
            "answer one".to_string(),
            "answer two".to_string(),
        ];
        assert!(evaluate(ConsensusStrategy::Quorum(2), &texts).is_accepted());
        assert!(!evaluate(ConsensusStrategy::Quorum(3), &texts).is_accepted());
    }

    #[test]
    fn test_two_phase_picks_most_central() {
        let texts = vec![
            "paris is the capital of france".to_string(),
            "the capital of france is paris".to_string(),
            "berlin obviously".to_string(),
        ];
        let outcome = evaluate(ConsensusStrategy::TwoPhase { threshold_pm: 300 }, &texts);
        match outcome {
            ConsensusOutcome::Accepted { text, .. } => assert!(text.contains("paris")),
            ConsensusOutcome::NoConsensus { .. } => panic!("threshold should be met"),
        }
    }

    #[test]
    fn test_two_phase_below_threshold_rejects() {
        let texts = vec![
            "completely different".to_string(),
            "nothing in common".to_string(),
        ];
        assert!(!evaluate(ConsensusStrategy::TwoPhase { threshold_pm: 900 }, &texts).is_accepted());
    }

    #[test]
    fn test_agreement_histogram_buckets() {
        let metrics = MetricsRegistry::new();
        record_agreement(&metrics, 0.85);
        record_agreement(&metrics, 0.15);
        let snap = metrics.snapshot();
        let (counts, _) = &snap.histograms["agreement_pct"];
        // 0.15 -> bucket <=0.2, 0.85 -> bucket <=0.9.
        assert_eq!(counts[0], 1);
        assert_eq!(counts[4], 1);
    }
}
