//! Escalation signals over a partial stream.
//!
//! Signals are evaluated as chunks arrive: low lexical diversity, low
//! adapter-reported confidence once enough output tokens exist to judge,
//! and explicit policy escalation. The router starts the next candidate on
//! the first signal (speculatively when enabled).

use std::collections::HashSet;

/// Escalation thresholds.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Output tokens required before confidence is judged.
    pub probe_tokens: u64,
    /// Confidence at or below this escalates.
    pub min_confidence: f64,
    /// Unique-token ratio at or below this escalates.
    pub min_lexical_diversity: f64,
    /// Minimum tokens before diversity is judged.
    pub diversity_min_tokens: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            probe_tokens: 32,
            min_confidence: 0.45,
            min_lexical_diversity: 0.2,
            diversity_min_tokens: 24,
        }
    }
}

/// Why escalation fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationSignal {
    /// Adapter-reported confidence stayed low past the probe window.
    LowConfidence,
    /// Output repeats itself (low unique-token ratio).
    LowLexicalDiversity,
    /// Policy layer demanded escalation.
    Policy,
}

/// Accumulates partial output and evaluates escalation signals.
pub struct StreamProbe {
    config: EscalationConfig,
    text: String,
    out_tokens: u64,
    last_confidence: f64,
    policy_escalate: bool,
    fired: Option<EscalationSignal>,
}

impl StreamProbe {
    /// Create a probe with the given thresholds.
    #[must_use]
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            text: String::new(),
            out_tokens: 0,
            last_confidence: 1.0,
            policy_escalate: false,
            fired: None,
        }
    }

    /// Feed one partial chunk; returns the signal the first time one fires.
    pub fn observe(
        &mut self,
        text: Option<&str>,
        confidence: f64,
        out_tokens: u64,
    ) -> Option<EscalationSignal> {
        if self.fired.is_some() {
            return None;
        }
        if let Some(t) = text {
            self.text.push_str(t);
        }
        self.out_tokens = self.out_tokens.max(out_tokens);
        self.last_confidence = confidence;

        if self.policy_escalate {
            return self.fire(EscalationSignal::Policy);
        }
        if self.out_tokens >= self.config.probe_tokens
            && self.last_confidence <= self.config.min_confidence
        {
            return self.fire(EscalationSignal::LowConfidence);
        }
        let tokens: Vec<&str> = self.text.split_whitespace().collect();
        if tokens.len() >= self.config.diversity_min_tokens {
            let unique: HashSet<String> =
                tokens.iter().map(|t| t.to_lowercase()).collect();
            let diversity = unique.len() as f64 / tokens.len() as f64;
            if diversity <= self.config.min_lexical_diversity {
                return self.fire(EscalationSignal::LowLexicalDiversity);
            }
        }
        None
    }

    /// Raise the explicit policy escalation flag; fires on next observe.
    pub fn escalate_by_policy(&mut self) {
        self.policy_escalate = true;
    }

    /// The signal that fired, if any.
    #[must_use]
    pub fn fired(&self) -> Option<EscalationSignal> {
        self.fired
    }

    fn fire(&mut self, signal: EscalationSignal) -> Option<EscalationSignal> {
        self.fired = Some(signal);
        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_confidence_after_probe_window() {
        let mut probe = StreamProbe::new(EscalationConfig::default());
        // Below the probe window: no judgement yet.
        assert_eq!(probe.observe(Some("short"), 0.3, 10), None);
        // Past it with confidence 0.3: fires.
        assert_eq!(
            probe.observe(Some("more text"), 0.3, 40),
            Some(EscalationSignal::LowConfidence)
        );
        // Fires once.
        assert_eq!(probe.observe(Some("again"), 0.1, 60), None);
        assert_eq!(probe.fired(), Some(EscalationSignal::LowConfidence));
    }

    #[test]
    fn test_confident_stream_never_fires() {
        let mut probe = StreamProbe::new(EscalationConfig::default());
        for i in 0..20 {
            let text = format!("unique token number {i} appears here ");
            assert_eq!(probe.observe(Some(&text), 0.9, i * 10), None);
        }
    }

    #[test]
    fn test_repetitive_output_fires_diversity() {
        let mut probe = StreamProbe::new(EscalationConfig::default());
        let repeated = "the same the same ".repeat(16);
        let signal = probe.observe(Some(&repeated), 0.9, 8);
        assert_eq!(signal, Some(EscalationSignal::LowLexicalDiversity));
    }

    #[test]
    fn test_policy_escalation_wins() {
        let mut probe = StreamProbe::new(EscalationConfig::default());
        probe.escalate_by_policy();
        assert_eq!(
            probe.observe(Some("anything"), 0.99, 1),
            Some(EscalationSignal::Policy)
        );
    }
}
