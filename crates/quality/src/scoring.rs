//! Continuity scoring.

use inkweave_core::issue::ContinuityIssue;

/// `max(0, 100 − Σ weight(severity))`. An empty list scores 100.
pub fn continuity_score(issues: &[ContinuityIssue]) -> f64 {
    let penalty: u32 = issues.iter().map(|i| i.severity.weight()).sum();
    f64::from(100u32.saturating_sub(penalty))
}

/// Whether any issue blocks acceptance.
pub fn has_blocking(issues: &[ContinuityIssue]) -> bool {
    issues.iter().any(|i| i.severity.is_blocking())
}
