//! Continuity issues and the severity weight table.
//!
//! Issues are computed fresh on every evaluation and never persisted.
//! The weight table here is the single source used by every score
//! computation in the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points deducted from the continuity score for one issue.
    pub const fn weight(self) -> u32 {
        match self {
            Self::Critical => 25,
            Self::High => 15,
            Self::Medium => 8,
            Self::Low => 3,
        }
    }

    /// Critical and high issues block acceptance while attempts remain.
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What part of the story an issue concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Entity,
    Plot,
    World,
    Timeline,
    Location,
    Tone,
    Voice,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Entity => "entity",
            Self::Plot => "plot",
            Self::World => "world",
            Self::Timeline => "timeline",
            Self::Location => "location",
            Self::Tone => "tone",
            Self::Voice => "voice",
        };
        f.write_str(s)
    }
}

/// A detected mismatch between generated text and its context or blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
    /// Instruction fed back to the generator as a correction directive.
    pub suggested_fix: String,
    #[serde(default)]
    pub auto_fixable: bool,
}

impl ContinuityIssue {
    pub fn new(
        category: IssueCategory,
        severity: Severity,
        message: impl Into<String>,
        suggested_fix: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            suggested_fix: suggested_fix.into(),
            auto_fixable: false,
        }
    }

    /// Mark the issue as fixable by a mechanical edit.
    pub fn auto_fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }
}

impl fmt::Display for ContinuityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.severity, self.category, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_matches_weights() {
        let mut all = [
            Severity::Medium,
            Severity::Critical,
            Severity::Low,
            Severity::High,
        ];
        all.sort();
        let weights: Vec<u32> = all.iter().map(|s| s.weight()).collect();
        assert_eq!(weights, vec![3, 8, 15, 25]);
    }

    #[test]
    fn only_critical_and_high_block() {
        assert!(Severity::Critical.is_blocking());
        assert!(Severity::High.is_blocking());
        assert!(!Severity::Medium.is_blocking());
        assert!(!Severity::Low.is_blocking());
    }

    #[test]
    fn issue_serializes_snake_case() {
        let issue = ContinuityIssue::new(
            IssueCategory::Entity,
            Severity::High,
            "Mara is missing",
            "Include Mara",
        );
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"entity\""));
        assert!(json.contains("\"high\""));
        assert_eq!(issue.to_string(), "[high/entity] Mara is missing");
    }
}
