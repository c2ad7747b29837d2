//! The quality evaluator: runs every check concurrently and scores the text.

use crate::checks::{
    CheckInput, EntityPresenceCheck, LifecycleCheck, LocationCheck, PrematureResolutionCheck,
    QualityCheck, ThreadAdvancementCheck, ToneCheck, WorldRuleCheck,
};
use crate::detectability::DetectabilityMetrics;
use crate::heuristics::{
    KeywordResolutionDetector, KeywordRuleChecker, KeywordToneDetector, LocationDetector,
    ResolutionDetector, RosterLocationDetector, ToneDetector, WorldRuleChecker,
};
use crate::scoring::continuity_score;
use futures::future::join_all;
use inkweave_core::context::AssembledContext;
use inkweave_core::issue::ContinuityIssue;
use inkweave_core::narrative::Blueprint;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Findings of every check, in check order.
    pub issues: Vec<ContinuityIssue>,
    pub continuity_score: f64,
    pub detectability_score: f64,
    pub metrics: DetectabilityMetrics,
}

impl Evaluation {
    pub fn blocking_issues(&self) -> impl Iterator<Item = &ContinuityIssue> {
        self.issues.iter().filter(|i| i.severity.is_blocking())
    }
}

pub struct QualityEvaluator {
    checks: Vec<Arc<dyn QualityCheck>>,
}

impl QualityEvaluator {
    /// The seven standard checks with keyword heuristics.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    /// An evaluator running exactly `checks`.
    pub fn with_checks(checks: Vec<Arc<dyn QualityCheck>>) -> Self {
        Self { checks }
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub async fn evaluate(
        &self,
        text: &str,
        context: &AssembledContext,
        blueprint: &Blueprint,
    ) -> Evaluation {
        let input = CheckInput {
            text,
            context,
            blueprint,
        };
        let results = join_all(self.checks.iter().map(|c| c.check(input))).await;
        let issues: Vec<ContinuityIssue> = results.into_iter().flatten().collect();

        let metrics = DetectabilityMetrics::measure(text);
        let evaluation = Evaluation {
            continuity_score: continuity_score(&issues),
            detectability_score: metrics.score(),
            metrics,
            issues,
        };
        debug!(
            unit = %context.unit,
            issues = evaluation.issues.len(),
            continuity = evaluation.continuity_score,
            detectability = evaluation.detectability_score,
            "Evaluated generated text"
        );
        evaluation
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Swaps heuristic strategies and appends extra checks.
pub struct EvaluatorBuilder {
    tone: Arc<dyn ToneDetector>,
    resolution: Arc<dyn ResolutionDetector>,
    rules: Arc<dyn WorldRuleChecker>,
    locations: Arc<dyn LocationDetector>,
    extra: Vec<Arc<dyn QualityCheck>>,
}

impl Default for EvaluatorBuilder {
    fn default() -> Self {
        Self {
            tone: Arc::new(KeywordToneDetector::default()),
            resolution: Arc::new(KeywordResolutionDetector::default()),
            rules: Arc::new(KeywordRuleChecker),
            locations: Arc::new(RosterLocationDetector),
            extra: Vec::new(),
        }
    }
}

impl EvaluatorBuilder {
    pub fn tone_detector(mut self, detector: Arc<dyn ToneDetector>) -> Self {
        self.tone = detector;
        self
    }

    pub fn resolution_detector(mut self, detector: Arc<dyn ResolutionDetector>) -> Self {
        self.resolution = detector;
        self
    }

    pub fn world_rule_checker(mut self, checker: Arc<dyn WorldRuleChecker>) -> Self {
        self.rules = checker;
        self
    }

    pub fn location_detector(mut self, detector: Arc<dyn LocationDetector>) -> Self {
        self.locations = detector;
        self
    }

    pub fn with_check(mut self, check: Arc<dyn QualityCheck>) -> Self {
        self.extra.push(check);
        self
    }

    pub fn build(self) -> QualityEvaluator {
        let mut checks: Vec<Arc<dyn QualityCheck>> = vec![
            Arc::new(EntityPresenceCheck),
            Arc::new(LifecycleCheck),
            Arc::new(LocationCheck::new(self.locations)),
            Arc::new(ThreadAdvancementCheck),
            Arc::new(PrematureResolutionCheck::new(self.resolution)),
            Arc::new(WorldRuleCheck::new(self.rules)),
            Arc::new(ToneCheck::new(self.tone)),
        ];
        checks.extend(self.extra);
        QualityEvaluator::with_checks(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use inkweave_core::entity::{EntityProfile, LifecycleState};
    use inkweave_core::issue::{IssueCategory, Severity};
    use inkweave_core::narrative::UnitId;
    use inkweave_core::thread::{PlotThread, ThreadStatus};

    fn context() -> AssembledContext {
        AssembledContext::new(UnitId::new("p", 1, 1))
    }

    #[tokio::test]
    async fn missing_expected_entity_scores_85() {
        let bp = Blueprint::new("meeting").with_entities(["A", "B"]);
        let eval = QualityEvaluator::new()
            .evaluate("A walked along the quay.", &context(), &bp)
            .await;
        assert_eq!(eval.issues.len(), 1);
        assert_eq!(eval.issues[0].category, IssueCategory::Entity);
        assert_eq!(eval.issues[0].severity, Severity::High);
        assert_eq!(eval.continuity_score, 85.0);
    }

    #[tokio::test]
    async fn deceased_entity_scores_75() {
        let mut ctx = context();
        ctx.entities.insert(
            "Ilya".into(),
            EntityProfile::new("Ilya").with_lifecycle(LifecycleState::Deceased),
        );
        let bp = Blueprint::new("visit").with_entities(["Ilya"]);
        let eval = QualityEvaluator::new()
            .evaluate("Ilya knocked on the door.", &ctx, &bp)
            .await;
        assert_eq!(eval.issues.len(), 1);
        assert_eq!(eval.issues[0].severity, Severity::Critical);
        assert_eq!(eval.continuity_score, 75.0);
    }

    #[tokio::test]
    async fn unreferenced_active_thread_scores_92() {
        let mut ctx = context();
        ctx.threads
            .push(PlotThread::new("x", "X").with_status(ThreadStatus::Active));
        let bp = Blueprint::new("interlude").with_threads(["x"]);
        let eval = QualityEvaluator::new()
            .evaluate("The kettle boiled over.", &ctx, &bp)
            .await;
        assert_eq!(eval.issues.len(), 1);
        assert_eq!(eval.issues[0].severity, Severity::Medium);
        assert_eq!(eval.continuity_score, 92.0);
    }

    #[tokio::test]
    async fn identical_inputs_identical_results() {
        let mut ctx = context();
        ctx.known_entities = vec!["Tobin".into()];
        ctx.known_locations = vec!["Harbor".into(), "Mill".into()];
        let bp = Blueprint::new("x")
            .with_entities(["Mara"])
            .at_location("Harbor")
            .with_tone("calm");
        let text = "Tobin shouted at the mill! He slammed the door, glared, and roared.";

        let evaluator = QualityEvaluator::new();
        let a = evaluator.evaluate(text, &ctx, &bp).await;
        let b = evaluator.evaluate(text, &ctx, &bp).await;
        assert_eq!(a, b);
        assert!(a.issues.len() >= 3);
    }

    struct AlwaysFlags;

    #[async_trait]
    impl QualityCheck for AlwaysFlags {
        fn name(&self) -> &str {
            "always"
        }

        async fn check(&self, _input: CheckInput<'_>) -> Vec<ContinuityIssue> {
            vec![ContinuityIssue::new(IssueCategory::Voice, Severity::Low, "voice", "fix voice")]
        }
    }

    struct NeverTone;

    impl ToneDetector for NeverTone {
        fn detect(&self, _text: &str) -> Option<String> {
            None
        }
        fn matches(&self, _detected: &str, _target: &str) -> Option<bool> {
            None
        }
    }

    #[tokio::test]
    async fn builder_swaps_strategies_and_adds_checks() {
        let evaluator = QualityEvaluator::builder()
            .tone_detector(Arc::new(NeverTone))
            .with_check(Arc::new(AlwaysFlags))
            .build();
        assert_eq!(evaluator.check_names().len(), 8);

        let bp = Blueprint::new("x").with_tone("joyful");
        let eval = evaluator
            .evaluate("Shadows. Footsteps. Silence... Fear.", &context(), &bp)
            .await;
        assert_eq!(eval.issues.len(), 1);
        assert_eq!(eval.issues[0].category, IssueCategory::Voice);
        assert_eq!(eval.continuity_score, 97.0);
    }
}
