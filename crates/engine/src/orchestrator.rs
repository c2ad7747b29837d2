//! The generation orchestrator: the generate/evaluate/retry loop.
//!
//! Each unit moves through:
//!
//! ```text
//! Assembling → Generating → PostProcessing → Evaluating
//!     → Accepted                       (persist, return outcome)
//!     → Retrying → Assembling          (attempts remain)
//!     → Failed                         (attempts exhausted)
//! ```
//!
//! Blocking (critical/high) issues and detectability above the threshold
//! both reject an attempt; so does a generation-service error or timeout.
//! Rejections add correction directives and back off
//! `base × multiplier^(attempt−1)` before the next attempt.

use crate::context::ContextAssembler;
use crate::postprocess::TextCleanup;
use crate::sequencer::{ChapterHandle, ChapterSequencer};
use chrono::Utc;
use inkweave_config::{AppConfig, ContextConfig, OrchestratorConfig};
use inkweave_core::attempt::{AttemptDecision, FailureReport, GenerationAttempt};
use inkweave_core::context::{AssembledContext, AssemblyMetadata};
use inkweave_core::error::{Error, Result, ServiceError};
use inkweave_core::event::{DomainEvent, EventBus};
use inkweave_core::narrative::{Blueprint, CorrectionDirectives, NarrativeUnit, UnitId};
use inkweave_core::service::{
    GenerationRequest, GenerationResponse, GenerationService, PostProcessor, ResearchService,
};
use inkweave_memory::MemoryCoordinator;
use inkweave_quality::text::mentions;
use inkweave_quality::{Evaluation, QualityEvaluator};
use serde::{Serialize, Serializer};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Directive added when an attempt reads as machine-generated.
pub const REDUCE_AI_PHRASING: &str = "Reduce AI-typical phrasing";

/// Where a unit currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Assembling,
    Generating,
    PostProcessing,
    Evaluating,
    Retrying,
    Accepted,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::PostProcessing => "post_processing",
            Self::Evaluating => "evaluating",
            Self::Retrying => "retrying",
            Self::Accepted => "accepted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An accepted unit and how it got there.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    /// The persisted unit.
    pub unit: NarrativeUnit,
    pub attempts: u32,
    /// Rejected attempts before acceptance.
    pub retries: u32,
    pub continuity_score: f64,
    pub detectability_score: f64,
    /// Wall-clock time from first assembly to persistence.
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
    pub history: Vec<GenerationAttempt>,
    /// Directives in force for the accepted attempt.
    pub directives: Vec<String>,
    /// Assembly metadata of the accepted attempt's context.
    pub context: AssemblyMetadata,
}

impl GenerationOutcome {
    pub fn content(&self) -> &str {
        &self.unit.content
    }
}

/// The result of running a whole chapter.
#[derive(Debug)]
pub struct ChapterReport {
    pub project: String,
    pub chapter: u32,
    /// Units accepted (and persisted) before any failure, in order.
    pub accepted: Vec<GenerationOutcome>,
    pub failure: Option<ChapterFailure>,
}

impl ChapterReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
pub struct ChapterFailure {
    pub unit: UnitId,
    pub error: Error,
}

pub struct Orchestrator {
    assembler: ContextAssembler,
    generator: Arc<dyn GenerationService>,
    post: Arc<dyn PostProcessor>,
    evaluator: Arc<QualityEvaluator>,
    memory: Arc<MemoryCoordinator>,
    events: Arc<EventBus>,
    sequencer: ChapterSequencer,
    settings: OrchestratorConfig,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn memory(&self) -> Arc<MemoryCoordinator> {
        self.memory.clone()
    }

    pub fn settings(&self) -> &OrchestratorConfig {
        &self.settings
    }

    /// Delay after the given (1-based) rejected attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let ms = self.settings.base_backoff_ms as f64 * self.settings.backoff_multiplier.powi(exponent);
        // `as` saturates, so an overflowing product stays finite.
        Duration::from_millis(ms as u64)
    }

    /// Chapters currently holding ordering state.
    pub fn tracked_chapters(&self) -> usize {
        self.sequencer.tracked()
    }

    /// Generate one unit, waiting for earlier units of the same chapter.
    ///
    /// Unit n starts only once unit n-1 has finished in this orchestrator
    /// (accepted or failed) or is already persisted, and no other unit of
    /// the chapter is running. Until then the call waits on `cancel`.
    pub async fn generate_unit(
        &self,
        unit: &UnitId,
        blueprint: &Blueprint,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let chapter = self.sequencer.chapter(&unit.project_id, unit.chapter);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            () = self.await_predecessor(&chapter, unit) => {}
        }
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = chapter.turn() => guard,
        };
        let result = self.run(unit, blueprint, cancel).await;
        chapter.finish(unit.unit);
        result
    }

    /// Generate a chapter's units in order, numbering them from 1.
    ///
    /// Stops at the first failure; units accepted before it stay persisted
    /// and are reported.
    pub async fn generate_chapter(
        &self,
        project: &str,
        chapter: u32,
        blueprints: &[Blueprint],
        cancel: &CancellationToken,
    ) -> ChapterReport {
        let mut report = ChapterReport {
            project: project.to_string(),
            chapter,
            accepted: Vec::with_capacity(blueprints.len()),
            failure: None,
        };

        let handle = self.sequencer.chapter(project, chapter);
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.failure = Some(ChapterFailure {
                    unit: UnitId::new(project, chapter, 1),
                    error: Error::Cancelled,
                });
                return report;
            }
            guard = handle.turn() => guard,
        };

        info!(project, chapter, units = blueprints.len(), "Generating chapter");
        for (index, blueprint) in (1u32..).zip(blueprints) {
            let unit = UnitId::new(project, chapter, index);
            let result = self.run(&unit, blueprint, cancel).await;
            handle.finish(index);
            match result {
                Ok(outcome) => report.accepted.push(outcome),
                Err(error) => {
                    warn!(
                        unit = %unit,
                        accepted = report.accepted.len(),
                        "Chapter stopped at failed unit"
                    );
                    // The rest of the chapter is abandoned; release anyone
                    // waiting on those units.
                    handle.finish(u32::try_from(blueprints.len()).unwrap_or(u32::MAX));
                    report.failure = Some(ChapterFailure { unit, error });
                    break;
                }
            }
        }
        report
    }

    /// Resolve once the unit before `unit` is finished or persisted.
    async fn await_predecessor(&self, chapter: &ChapterHandle, unit: &UnitId) {
        let Some(previous) = unit.unit.checked_sub(1).filter(|n| *n > 0) else {
            return;
        };
        let previous_id = UnitId::new(unit.project_id.clone(), unit.chapter, previous);
        let mut finished = chapter.subscribe();
        loop {
            let done = *finished.borrow_and_update() >= previous;
            if done || self.memory.unit(&previous_id).await.is_some() {
                return;
            }
            debug!(unit = %unit, waiting_for = previous, "Waiting for predecessor");
            if finished.changed().await.is_err() {
                return;
            }
        }
    }

    async fn run(
        &self,
        unit: &UnitId,
        blueprint: &Blueprint,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let result = self.attempt_loop(unit, blueprint, cancel).await;
        if let Err(e) = &result {
            warn!(unit = %unit, state = %PipelineState::Failed, error = %e, "Unit failed");
            self.events.publish(DomainEvent::UnitFailed {
                unit: unit.to_string(),
                attempts: attempts_of(e),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn attempt_loop(
        &self,
        unit: &UnitId,
        blueprint: &Blueprint,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let started = Instant::now();
        let max = self.settings.max_attempts;
        let threshold = self.settings.detectability_threshold;
        let mut directives = CorrectionDirectives::new(self.settings.max_directives);
        let mut history: Vec<GenerationAttempt> = Vec::new();
        let mut last_evaluation: Option<Evaluation> = None;
        let mut last_service_error: Option<ServiceError> = None;

        for attempt in 1..=max {
            let attempt_started = Instant::now();
            let remaining = attempt < max;

            trace_state(unit, attempt, PipelineState::Assembling);
            let context = self.assembler.assemble(unit, blueprint, cancel).await?;

            trace_state(unit, attempt, PipelineState::Generating);
            let request = self.request(&context, blueprint, &directives)?;
            let response = match self.call_generator(request, cancel).await? {
                Ok(response) => response,
                Err(e) => {
                    warn!(unit = %unit, attempt, error = %e, "Generation call failed");
                    history.push(GenerationAttempt {
                        attempt,
                        continuity_score: None,
                        detectability_score: None,
                        issues: Vec::new(),
                        decision: AttemptDecision::RetryServiceError {
                            message: e.to_string(),
                        },
                        latency_ms: elapsed_ms(attempt_started),
                    });
                    self.publish_rejection(unit, attempt, format!("generation failed: {e}"), None);
                    last_service_error = Some(e);
                    if remaining {
                        self.back_off(unit, attempt, cancel).await?;
                    }
                    continue;
                }
            };
            last_service_error = None;

            trace_state(unit, attempt, PipelineState::PostProcessing);
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                text = self.post.process(response.content) => text,
            };

            trace_state(unit, attempt, PipelineState::Evaluating);
            let evaluation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                evaluation = self.evaluator.evaluate(&text, &context, blueprint) => evaluation,
            };

            let fixes: Vec<String> = evaluation
                .blocking_issues()
                .map(|i| i.suggested_fix.clone())
                .collect();
            let too_detectable = evaluation.detectability_score > threshold;
            let decision = match (fixes.is_empty(), too_detectable, remaining) {
                (true, false, _) => AttemptDecision::Accepted,
                (false, _, true) => AttemptDecision::RetryContinuity {
                    blocking_issues: fixes.len(),
                },
                (true, true, true) => AttemptDecision::RetryDetectability {
                    score: evaluation.detectability_score,
                    threshold,
                },
                (_, _, false) => AttemptDecision::Failed,
            };
            history.push(GenerationAttempt {
                attempt,
                continuity_score: Some(evaluation.continuity_score),
                detectability_score: Some(evaluation.detectability_score),
                issues: evaluation.issues.clone(),
                decision: decision.clone(),
                latency_ms: elapsed_ms(attempt_started),
            });

            match decision {
                AttemptDecision::Accepted => {
                    let outcome = Accepted {
                        text,
                        context: &context,
                        evaluation,
                        attempt,
                        directives: directives.to_vec(),
                        history,
                        started,
                    };
                    return self.accept(unit, blueprint, outcome).await;
                }
                AttemptDecision::Failed => {
                    let report = Box::new(failure_report(attempt, evaluation, threshold, history));
                    return Err(if fixes.is_empty() {
                        Error::DetectabilityFailure(report)
                    } else {
                        Error::ContinuityFailure(report)
                    });
                }
                AttemptDecision::RetryContinuity { blocking_issues } => {
                    for fix in fixes {
                        directives.push(fix);
                    }
                    self.publish_rejection(
                        unit,
                        attempt,
                        format!("{blocking_issues} blocking continuity issue(s)"),
                        Some(&evaluation),
                    );
                }
                AttemptDecision::RetryDetectability { score, .. } => {
                    directives.push(REDUCE_AI_PHRASING);
                    self.publish_rejection(
                        unit,
                        attempt,
                        format!("detectability {score:.1} above {threshold:.1}"),
                        Some(&evaluation),
                    );
                }
                AttemptDecision::RetryServiceError { .. } => {}
            }
            last_evaluation = Some(evaluation);
            self.back_off(unit, attempt, cancel).await?;
        }

        // Only reachable when the final attempt's generation call failed.
        match last_service_error {
            Some(source) => Err(Error::GenerationServiceFailure {
                attempts: max,
                source,
                last_evaluated: last_evaluation
                    .map(|e| Box::new(failure_report(max, e, threshold, history))),
            }),
            None => Err(Error::ConfigurationFailure {
                message: "orchestrator.max_attempts must be at least 1".into(),
            }),
        }
    }

    async fn accept(
        &self,
        unit: &UnitId,
        blueprint: &Blueprint,
        accepted: Accepted<'_>,
    ) -> Result<GenerationOutcome> {
        let Accepted {
            text,
            context,
            evaluation,
            attempt,
            directives,
            history,
            started,
        } = accepted;

        let entities = referenced_entities(&text, context, blueprint);
        let threads = referenced_threads(&text, context);
        let mut narrative = NarrativeUnit::new(unit.clone(), text)
            .with_entities(entities)
            .with_threads(threads);
        if let Some(tone) = &blueprint.target_tone {
            narrative = narrative.with_tone(tone.clone());
        }

        self.memory.put_unit(&narrative).await?;

        let latency = started.elapsed();
        info!(
            unit = %unit,
            state = %PipelineState::Accepted,
            attempts = attempt,
            continuity = evaluation.continuity_score,
            detectability = evaluation.detectability_score,
            words = narrative.word_count,
            latency_ms = latency.as_millis() as u64,
            "Unit accepted"
        );
        self.events.publish(DomainEvent::UnitAccepted {
            unit: unit.to_string(),
            attempts: attempt,
            continuity_score: evaluation.continuity_score,
            detectability_score: evaluation.detectability_score,
            word_count: narrative.word_count,
            timestamp: Utc::now(),
        });

        Ok(GenerationOutcome {
            unit: narrative,
            attempts: attempt,
            retries: attempt - 1,
            continuity_score: evaluation.continuity_score,
            detectability_score: evaluation.detectability_score,
            latency,
            history,
            directives,
            context: context.metadata.clone(),
        })
    }

    fn request(
        &self,
        context: &AssembledContext,
        blueprint: &Blueprint,
        directives: &CorrectionDirectives,
    ) -> Result<GenerationRequest> {
        let mut task = format!(
            "Write unit {} of chapter {}.",
            context.unit.unit, context.unit.chapter
        );
        if !blueprint.scene_goal.is_empty() {
            task.push_str(&format!(" Scene goal: {}.", blueprint.scene_goal));
        }
        if let Some(words) = blueprint.target_word_count {
            task.push_str(&format!(" Aim for about {words} words."));
        }

        Ok(GenerationRequest {
            task,
            context: json!({
                "context": serde_json::to_value(context)?,
                "blueprint": serde_json::to_value(blueprint)?,
                "directives": directives.to_vec(),
            }),
            max_agents: self.settings.max_agents,
            timeout_ms: Some(self.settings.generation_timeout_ms),
        })
    }

    /// Outer error is cancellation; inner is the service's own failure.
    async fn call_generator(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<GenerationResponse, ServiceError>> {
        let limit = Duration::from_millis(self.settings.generation_timeout_ms);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(limit, self.generator.generate(request)) => {
                Ok(outcome.unwrap_or_else(|_| {
                    Err(ServiceError::Timeout(format!(
                        "no response from {} within {}ms",
                        self.generator.name(),
                        limit.as_millis()
                    )))
                }))
            }
        }
    }

    async fn back_off(&self, unit: &UnitId, attempt: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = self.backoff_delay(attempt);
        debug!(
            unit = %unit,
            attempt,
            state = %PipelineState::Retrying,
            delay_ms = delay.as_millis() as u64,
            "Backing off before retry"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn publish_rejection(
        &self,
        unit: &UnitId,
        attempt: u32,
        reason: String,
        evaluation: Option<&Evaluation>,
    ) {
        info!(unit = %unit, attempt, reason = %reason, "Attempt rejected");
        self.events.publish(DomainEvent::AttemptRejected {
            unit: unit.to_string(),
            attempt,
            reason,
            continuity_score: evaluation.map(|e| e.continuity_score),
            detectability_score: evaluation.map(|e| e.detectability_score),
            timestamp: Utc::now(),
        });
    }
}

/// Everything `accept` needs from the winning attempt.
struct Accepted<'a> {
    text: String,
    context: &'a AssembledContext,
    evaluation: Evaluation,
    attempt: u32,
    directives: Vec<String>,
    history: Vec<GenerationAttempt>,
    started: Instant,
}

fn as_millis<S: Serializer>(latency: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX))
}

fn trace_state(unit: &UnitId, attempt: u32, state: PipelineState) {
    debug!(unit = %unit, attempt, state = %state, "Pipeline state");
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failure_report(
    attempts: u32,
    evaluation: Evaluation,
    threshold: f64,
    history: Vec<GenerationAttempt>,
) -> FailureReport {
    FailureReport {
        attempts,
        issues: evaluation.issues,
        continuity_score: evaluation.continuity_score,
        detectability_score: evaluation.detectability_score,
        detectability_threshold: threshold,
        history,
    }
}

fn attempts_of(error: &Error) -> u32 {
    match error {
        Error::GenerationServiceFailure { attempts, .. } => *attempts,
        other => other.report().map_or(0, |r| r.attempts),
    }
}

/// Known entity names (or their aliases) that appear in `text`.
fn referenced_entities(
    text: &str,
    context: &AssembledContext,
    blueprint: &Blueprint,
) -> BTreeSet<String> {
    let candidates: BTreeSet<&str> = blueprint
        .expected_entities
        .iter()
        .chain(&context.known_entities)
        .chain(context.entities.keys())
        .map(String::as_str)
        .collect();
    candidates
        .into_iter()
        .filter(|name| match context.entities.get(*name) {
            Some(profile) => profile.names().any(|n| mentions(text, n, false)),
            None => mentions(text, name, false),
        })
        .map(String::from)
        .collect()
}

/// Context threads referenced by name or key event.
fn referenced_threads(text: &str, context: &AssembledContext) -> BTreeSet<String> {
    context
        .threads
        .iter()
        .filter(|t| {
            std::iter::once(&t.name)
                .chain(&t.key_events)
                .any(|phrase| mentions(text, phrase, true))
        })
        .map(|t| t.id.clone())
        .collect()
}

/// Assembles an [`Orchestrator`]. Memory and a generation service are
/// required; everything else has a default.
#[derive(Default)]
pub struct OrchestratorBuilder {
    memory: Option<Arc<MemoryCoordinator>>,
    generator: Option<Arc<dyn GenerationService>>,
    research: Option<Arc<dyn ResearchService>>,
    post: Option<Arc<dyn PostProcessor>>,
    evaluator: Option<QualityEvaluator>,
    events: Option<Arc<EventBus>>,
    context: ContextConfig,
    settings: OrchestratorConfig,
}

impl OrchestratorBuilder {
    pub fn memory(mut self, memory: Arc<MemoryCoordinator>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn research(mut self, research: Arc<dyn ResearchService>) -> Self {
        self.research = Some(research);
        self
    }

    pub fn post_processor(mut self, post: Arc<dyn PostProcessor>) -> Self {
        self.post = Some(post);
        self
    }

    pub fn evaluator(mut self, evaluator: QualityEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn context_config(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    pub fn settings(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Take the context and orchestrator sections of an application config.
    pub fn config(self, config: &AppConfig) -> Self {
        self.context_config(config.context.clone())
            .settings(config.orchestrator.clone())
    }

    pub fn build(self) -> Result<Orchestrator> {
        let memory = self.memory.ok_or_else(|| missing("a memory coordinator"))?;
        let generator = self.generator.ok_or_else(|| missing("a generation service"))?;

        let s = &self.settings;
        if s.max_attempts == 0 {
            return Err(invalid("orchestrator.max_attempts must be at least 1"));
        }
        if !s.backoff_multiplier.is_finite() || s.backoff_multiplier < 1.0 {
            return Err(invalid("orchestrator.backoff_multiplier must be >= 1"));
        }
        if s.max_directives == 0 {
            return Err(invalid("orchestrator.max_directives must be at least 1"));
        }
        if s.generation_timeout_ms == 0 {
            return Err(invalid("orchestrator.generation_timeout_ms must be > 0"));
        }

        let events = self.events.unwrap_or_default();
        let mut assembler =
            ContextAssembler::new(memory.clone(), self.context).with_events(events.clone());
        if let Some(research) = self.research {
            assembler = assembler.with_research(research);
        }

        Ok(Orchestrator {
            assembler,
            generator,
            post: self.post.unwrap_or_else(|| Arc::new(TextCleanup::new())),
            evaluator: Arc::new(self.evaluator.unwrap_or_default()),
            memory,
            events,
            sequencer: ChapterSequencer::new(),
            settings: self.settings,
        })
    }
}

fn missing(what: &str) -> Error {
    Error::ConfigurationFailure {
        message: format!("orchestrator requires {what}"),
    }
}

fn invalid(message: &str) -> Error {
    Error::ConfigurationFailure {
        message: message.to_string(),
    }
}
