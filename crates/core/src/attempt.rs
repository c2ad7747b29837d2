//! Per-run generation attempts and the diagnostic report surfaced on failure.

use crate::issue::{ContinuityIssue, Severity};
use serde::{Deserialize, Serialize};

/// What the orchestrator decided after an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptDecision {
    Accepted,
    /// Blocking (critical/high) issues remained.
    RetryContinuity { blocking_issues: usize },
    /// Detectability score above the threshold.
    RetryDetectability { score: f64, threshold: f64 },
    /// The generation service errored or timed out.
    RetryServiceError { message: String },
    /// Attempts exhausted with gates still failing.
    Failed,
}

/// One pass through the pipeline. Lives only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// 1-based.
    pub attempt: u32,
    /// Absent when generation itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detectability_score: Option<f64>,
    #[serde(default)]
    pub issues: Vec<ContinuityIssue>,
    pub decision: AttemptDecision,
    pub latency_ms: u64,
}

impl GenerationAttempt {
    pub fn was_evaluated(&self) -> bool {
        self.continuity_score.is_some()
    }

    pub fn blocking_issues(&self) -> impl Iterator<Item = &ContinuityIssue> {
        self.issues.iter().filter(|i| i.severity.is_blocking())
    }
}

/// Everything known about the last evaluated attempt of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Attempts made in total.
    pub attempts: u32,
    /// The last evaluated attempt's full issue list.
    pub issues: Vec<ContinuityIssue>,
    pub continuity_score: f64,
    pub detectability_score: f64,
    pub detectability_threshold: f64,
    /// Every attempt of the run, in order.
    pub history: Vec<GenerationAttempt>,
}

impl FailureReport {
    /// Retries consumed. Every attempt of a failed run was rejected, so
    /// this equals `attempts` (the configured maximum for an exhausted run).
    pub fn retries(&self) -> u32 {
        self.attempts
    }

    /// Highest severity among the reported issues.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// One-line human summary: score plus blocking issue messages.
    pub fn summary(&self) -> String {
        let blocking: Vec<String> = self
            .issues
            .iter()
            .filter(|i| i.severity.is_blocking())
            .map(ToString::to_string)
            .collect();
        if blocking.is_empty() {
            format!("continuity {:.0}", self.continuity_score)
        } else {
            format!(
                "continuity {:.0}; {}",
                self.continuity_score,
                blocking.join("; ")
            )
        }
    }
}
