//! Success validation of finalized answers.
//!
//! Pluggable: the kernel wires one validator; success (`format_ok` and
//! `safety_ok`) feeds UCB success counts and the model quality gauges.

use lattice_core::ModelId;
use lattice_telemetry::MetricsRegistry;
use serde::Serialize;

/// Verdict of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationVerdict {
    /// The response is structurally sound.
    pub format_ok: bool,
    /// The response passed safety screening.
    pub safety_ok: bool,
    /// Quality estimate (0..1).
    pub quality_score: f64,
}

impl ValidationVerdict {
    /// Overall success: format and safety both hold.
    #[must_use]
    pub fn success(&self) -> bool {
        self.format_ok && self.safety_ok
    }
}

/// Pluggable success validator.
pub trait SuccessValidator: Send + Sync {
    /// Validate a finalized response.
    fn validate(&self, response_text: &str, prompt: &str, model: &ModelId) -> ValidationVerdict;
}

/// Default validator: structural checks plus a light quality heuristic.
pub struct BasicValidator {
    /// Substrings that mark an unsafe response.
    blocked_terms: Vec<String>,
}

impl BasicValidator {
    /// Create a validator with the default blocklist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocked_terms: vec!["[REDACTION-FAILED]".to_string()],
        }
    }

    /// Replace the blocklist.
    #[must_use]
    pub fn with_blocked_terms(mut self, terms: Vec<String>) -> Self {
        self.blocked_terms = terms;
        self
    }
}

impl Default for BasicValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SuccessValidator for BasicValidator {
    fn validate(&self, response_text: &str, prompt: &str, _model: &ModelId) -> ValidationVerdict {
        let trimmed = response_text.trim();
        let format_ok = !trimmed.is_empty() && balanced(trimmed);
        let safety_ok = !self
            .blocked_terms
            .iter()
            .any(|term| response_text.contains(term));

        // Crude quality proxy: length adequacy relative to the prompt plus
        // lexical variety, squashed into [0, 1].
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        let unique: std::collections::HashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();
        let variety = if words.is_empty() {
            0.0
        } else {
            unique.len() as f64 / words.len() as f64
        };
        let adequacy = (words.len() as f64 / (prompt.split_whitespace().count().max(4) as f64))
            .min(1.0);
        let quality_score = (0.6 * variety + 0.4 * adequacy).clamp(0.0, 1.0);

        ValidationVerdict {
            format_ok,
            safety_ok,
            quality_score,
        }
    }
}

fn balanced(text: &str) -> bool {
    let mut depth_brace = 0i64;
    let mut depth_bracket = 0i64;
    for ch in text.chars() {
        match ch {
            '{' => depth_brace += 1,
            '}' => depth_brace -= 1,
            '[' => depth_bracket += 1,
            ']' => depth_bracket -= 1,
            _ => {},
        }
        if depth_brace < 0 || depth_bracket < 0 {
            return false;
        }
    }
    depth_brace == 0 && depth_bracket == 0
}

/// Record a verdict into the model quality metrics
/// (`model_success_rate`, `quality_score_avg`, `validations_total`).
pub fn record_verdict(metrics: &MetricsRegistry, model: &ModelId, verdict: &ValidationVerdict) {
    metrics.counter("validations_total").inc();
    let labels = [("model", model.as_str())];
    metrics
        .counter_with("validation_success_total", &labels)
        .inc_by(u64::from(verdict.success()));
    metrics
        .histogram("quality_score_avg", &[0.2, 0.4, 0.6, 0.8, 0.9])
        .observe(verdict.quality_score);
    metrics
        .gauge_with("model_success_rate", &labels)
        .set(if verdict.success() { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelId {
        ModelId::new("slm-1")
    }

    #[test]
    fn test_reasonable_answer_succeeds() {
        let v = BasicValidator::new();
        let verdict = v.validate(
            "Retrieval augmented generation looks up documents and conditions the model on them.",
            "Explain RAG simply",
            &model(),
        );
        assert!(verdict.success());
        assert!(verdict.quality_score > 0.5);
    }

    #[test]
    fn test_empty_answer_fails_format() {
        let v = BasicValidator::new();
        assert!(!v.validate("   ", "prompt", &model()).format_ok);
    }

    #[test]
    fn test_unbalanced_structure_fails_format() {
        let v = BasicValidator::new();
        assert!(!v.validate("{\"answer\": [1, 2", "prompt", &model()).format_ok);
    }

    #[test]
    fn test_blocked_term_fails_safety() {
        let v = BasicValidator::new().with_blocked_terms(vec!["FORBIDDEN".to_string()]);
        let verdict = v.validate("this is FORBIDDEN content", "prompt", &model());
        assert!(verdict.format_ok);
        assert!(!verdict.safety_ok);
        assert!(!verdict.success());
    }

    #[test]
    fn test_verdict_recorded_to_metrics() {
        let metrics = MetricsRegistry::new();
        let verdict = ValidationVerdict {
            format_ok: true,
            safety_ok: true,
            quality_score: 0.85,
        };
        record_verdict(&metrics, &model(), &verdict);
        assert_eq!(metrics.counter_value("validations_total"), 1);
    }
}
