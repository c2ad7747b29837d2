//! The seven continuity checks.
//!
//! Every check is side-effect free and independent of the others, so the
//! evaluator runs them concurrently and concatenates their findings.

use crate::heuristics::{
    KeywordResolutionDetector, KeywordRuleChecker, KeywordToneDetector, LocationDetector,
    ResolutionDetector, RosterLocationDetector, ToneDetector, WorldRuleChecker,
    resolving_sentences,
};
use crate::text::mentions;
use async_trait::async_trait;
use inkweave_core::context::AssembledContext;
use inkweave_core::entity::EntityProfile;
use inkweave_core::issue::{ContinuityIssue, IssueCategory, Severity};
use inkweave_core::narrative::Blueprint;
use inkweave_core::thread::ThreadStatus;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// What every check looks at.
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub text: &'a str,
    pub context: &'a AssembledContext,
    pub blueprint: &'a Blueprint,
}

/// A single continuity check.
#[async_trait]
pub trait QualityCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue>;
}

/// Entity names match case-sensitively on the name or any alias.
fn entity_mentioned(text: &str, name: &str, profile: Option<&EntityProfile>) -> bool {
    match profile {
        Some(p) => p.names().any(|n| mentions(text, n, false)),
        None => mentions(text, name, false),
    }
}

// ── 1. Entity presence ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EntityPresenceCheck;

#[async_trait]
impl QualityCheck for EntityPresenceCheck {
    fn name(&self) -> &str {
        "entity_presence"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        let CheckInput { text, context, blueprint } = input;
        let mut issues = Vec::new();

        for name in &blueprint.expected_entities {
            if !entity_mentioned(text, name, context.entities.get(name)) {
                issues.push(ContinuityIssue::new(
                    IssueCategory::Entity,
                    Severity::High,
                    format!("Expected entity '{name}' does not appear"),
                    format!("Include {name} in the scene"),
                ));
            }
        }

        let candidates: BTreeSet<&str> = context
            .known_entities
            .iter()
            .map(String::as_str)
            .chain(context.entities.keys().map(String::as_str))
            .filter(|n| !blueprint.expected_entities.iter().any(|e| e == *n))
            // Reported as critical by the lifecycle check.
            .filter(|n| !context.known_deceased.iter().any(|d| d == n))
            .collect();
        for name in candidates {
            if entity_mentioned(text, name, context.entities.get(name)) {
                issues.push(ContinuityIssue::new(
                    IssueCategory::Entity,
                    Severity::Medium,
                    format!("Unexpected entity '{name}' appears"),
                    format!("Remove {name} or keep them off-page in this scene"),
                ));
            }
        }
        issues
    }
}

// ── 2. Lifecycle ─────────────────────────────────────────────────────────

/// Deceased entities may not appear. Profiles in the context are checked
/// on every name and alias; the project-wide deceased roster covers
/// everyone else.
#[derive(Debug, Default)]
pub struct LifecycleCheck;

#[async_trait]
impl QualityCheck for LifecycleCheck {
    fn name(&self) -> &str {
        "lifecycle"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        let CheckInput { text, context, .. } = input;
        let mut flagged: Vec<&str> = context
            .entities
            .values()
            .filter(|p| p.is_deceased() && entity_mentioned(text, &p.name, Some(p)))
            .map(|p| p.name.as_str())
            .collect();

        let covered: BTreeSet<&str> = context.entities.values().flat_map(|p| p.names()).collect();
        for name in &context.known_deceased {
            if !covered.contains(name.as_str())
                && !flagged.contains(&name.as_str())
                && mentions(text, name, false)
            {
                flagged.push(name.as_str());
            }
        }

        flagged
            .into_iter()
            .map(|name| {
                ContinuityIssue::new(
                    IssueCategory::Entity,
                    Severity::Critical,
                    format!("'{name}' is deceased but appears in the scene"),
                    format!("{name} is dead; refer to them only in memory or dialogue about the past"),
                )
            })
            .collect()
    }
}

// ── 3. Location ──────────────────────────────────────────────────────────

pub struct LocationCheck {
    detector: Arc<dyn LocationDetector>,
}

impl LocationCheck {
    pub fn new(detector: Arc<dyn LocationDetector>) -> Self {
        Self { detector }
    }
}

impl Default for LocationCheck {
    fn default() -> Self {
        Self::new(Arc::new(RosterLocationDetector))
    }
}

#[async_trait]
impl QualityCheck for LocationCheck {
    fn name(&self) -> &str {
        "location"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        let Some(expected) = input.blueprint.location.as_deref() else {
            return Vec::new();
        };
        if mentions(input.text, expected, true) {
            return Vec::new();
        }

        let elsewhere: Vec<String> = self
            .detector
            .detect(input.text, &input.context.known_locations)
            .into_iter()
            .filter(|l| !l.eq_ignore_ascii_case(expected))
            .collect();

        let issue = if elsewhere.is_empty() {
            ContinuityIssue::new(
                IssueCategory::Location,
                Severity::Low,
                format!("Location '{expected}' is never established"),
                format!("Establish that the scene takes place at {expected}"),
            )
            .auto_fixable()
        } else {
            ContinuityIssue::new(
                IssueCategory::Location,
                Severity::High,
                format!(
                    "Scene is set at {} instead of '{expected}'",
                    elsewhere.join(", ")
                ),
                format!("Set the scene at {expected}"),
            )
        };
        vec![issue]
    }
}

// ── 4. Thread advancement ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ThreadAdvancementCheck;

#[async_trait]
impl QualityCheck for ThreadAdvancementCheck {
    fn name(&self) -> &str {
        "thread_advancement"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        let mut issues = Vec::new();
        for id in &input.blueprint.thread_refs {
            let Some(thread) = input.context.thread(id) else {
                debug!(thread = %id, "Referenced thread not in context, skipping");
                continue;
            };
            if !thread.status.is_open() {
                continue;
            }
            let referenced = std::iter::once(thread.name.as_str())
                .chain(thread.key_events.iter().map(String::as_str))
                .any(|phrase| mentions(input.text, phrase, true));
            if !referenced {
                issues.push(ContinuityIssue::new(
                    IssueCategory::Plot,
                    Severity::Medium,
                    format!("Thread '{}' is not advanced", thread.name),
                    format!("Advance the '{}' thread", thread.name),
                ));
            }
        }
        issues
    }
}

// ── 5. Premature resolution ──────────────────────────────────────────────

pub struct PrematureResolutionCheck {
    detector: Arc<dyn ResolutionDetector>,
}

impl PrematureResolutionCheck {
    pub fn new(detector: Arc<dyn ResolutionDetector>) -> Self {
        Self { detector }
    }
}

impl Default for PrematureResolutionCheck {
    fn default() -> Self {
        Self::new(Arc::new(KeywordResolutionDetector::default()))
    }
}

#[async_trait]
impl QualityCheck for PrematureResolutionCheck {
    fn name(&self) -> &str {
        "premature_resolution"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        input
            .context
            .threads
            .iter()
            .filter(|t| t.status != ThreadStatus::Resolved)
            .filter_map(|t| {
                let hits = resolving_sentences(self.detector.as_ref(), input.text, t);
                let first = hits.first()?;
                Some(ContinuityIssue::new(
                    IssueCategory::Plot,
                    Severity::High,
                    format!("Thread '{}' appears resolved early: \"{first}\"", t.name),
                    format!("Do not resolve the '{}' thread yet", t.name),
                ))
            })
            .collect()
    }
}

// ── 6. World rules ───────────────────────────────────────────────────────

pub struct WorldRuleCheck {
    checker: Arc<dyn WorldRuleChecker>,
}

impl WorldRuleCheck {
    pub fn new(checker: Arc<dyn WorldRuleChecker>) -> Self {
        Self { checker }
    }
}

impl Default for WorldRuleCheck {
    fn default() -> Self {
        Self::new(Arc::new(KeywordRuleChecker))
    }
}

#[async_trait]
impl QualityCheck for WorldRuleCheck {
    fn name(&self) -> &str {
        "world_rules"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        input
            .context
            .world_rules
            .iter()
            .filter(|r| r.active)
            .filter_map(|rule| {
                let found = self.checker.violations(input.text, rule);
                if found.is_empty() {
                    return None;
                }
                let subject = if rule.description.is_empty() {
                    rule.id.as_str()
                } else {
                    rule.description.as_str()
                };
                Some(ContinuityIssue::new(
                    IssueCategory::World,
                    Severity::Medium,
                    format!(
                        "Possible {} rule violation ({}): {}",
                        rule.category,
                        rule.id,
                        found.join(", ")
                    ),
                    format!("Respect the world rule: {subject}"),
                ))
            })
            .collect()
    }
}

// ── 7. Tone ──────────────────────────────────────────────────────────────

pub struct ToneCheck {
    detector: Arc<dyn ToneDetector>,
}

impl ToneCheck {
    pub fn new(detector: Arc<dyn ToneDetector>) -> Self {
        Self { detector }
    }
}

impl Default for ToneCheck {
    fn default() -> Self {
        Self::new(Arc::new(KeywordToneDetector::default()))
    }
}

#[async_trait]
impl QualityCheck for ToneCheck {
    fn name(&self) -> &str {
        "tone"
    }

    async fn check(&self, input: CheckInput<'_>) -> Vec<ContinuityIssue> {
        let Some(target) = input.blueprint.target_tone.as_deref() else {
            return Vec::new();
        };
        let Some(detected) = self.detector.detect(input.text) else {
            return Vec::new();
        };
        match self.detector.matches(&detected, target) {
            Some(false) => vec![ContinuityIssue::new(
                IssueCategory::Tone,
                Severity::Medium,
                format!("Tone reads as {detected}, expected {target}"),
                format!("Shift the tone toward {target}"),
            )],
            Some(true) => Vec::new(),
            None => {
                debug!(target_tone = target, detected = %detected, "Target tone not recognised, skipping");
                Vec::new()
            }
        }
    }
}
