//! Detectability metrics: a 0–100 estimate (lower is better) of how
//! machine-generated a passage reads.
//!
//! Four sub-metrics, each clamped to `[0, 1]` with higher meaning more
//! human-like, are weighted equally:
//!
//! | metric | definition |
//! |--------|------------|
//! | `vocab_diversity` | unique words / total words |
//! | `sentence_entropy` | variance of sentence word counts / mean² |
//! | `perplexity_proxy` | `1 / (1 + ln(mean word frequency))` |
//! | `burstiness` | std-dev / mean of sentence word counts |

use crate::text::{sentences, words};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DetectabilityMetrics {
    pub vocab_diversity: f64,
    pub sentence_entropy: f64,
    pub perplexity_proxy: f64,
    pub burstiness: f64,
}

impl DetectabilityMetrics {
    pub fn measure(text: &str) -> Self {
        let tokens = words(text);
        if tokens.is_empty() {
            return Self::default();
        }
        let total = tokens.len() as f64;
        let unique = tokens.iter().collect::<HashSet<_>>().len() as f64;

        let lengths: Vec<f64> = sentences(text)
            .iter()
            .map(|s| words(s).len() as f64)
            .filter(|n| *n > 0.0)
            .collect();
        let (mean, variance) = mean_and_variance(&lengths);
        let (sentence_entropy, burstiness) = if mean > 0.0 {
            (variance / (mean * mean), variance.sqrt() / mean)
        } else {
            (0.0, 0.0)
        };

        Self {
            vocab_diversity: clamp_unit(unique / total),
            sentence_entropy: clamp_unit(sentence_entropy),
            perplexity_proxy: clamp_unit(1.0 / (1.0 + (total / unique).ln())),
            burstiness: clamp_unit(burstiness),
        }
    }

    /// Weighted score in `[0, 100]`.
    pub fn score(&self) -> f64 {
        let raw = 0.25 * (1.0 - self.vocab_diversity)
            + 0.25 * (1.0 - self.sentence_entropy)
            + 0.25 * (1.0 - self.perplexity_proxy)
            + 0.25 * (1.0 - self.burstiness);
        (raw * 100.0).clamp(0.0, 100.0)
    }
}

/// Shorthand for `DetectabilityMetrics::measure(text).score()`.
pub fn detectability_score(text: &str) -> f64 {
    DetectabilityMetrics::measure(text).score()
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}
