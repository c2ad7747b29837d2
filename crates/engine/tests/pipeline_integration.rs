//! End-to-end tests of the generate/evaluate/retry pipeline.
//!
//! A scripted generation service stands in for the real one; memory is the
//! in-memory coordinator. Time is paused so backoff sleeps resolve
//! instantly.

use async_trait::async_trait;
use inkweave_config::{CacheConfig, OrchestratorConfig};
use inkweave_core::attempt::AttemptDecision;
use inkweave_core::entity::{EntityProfile, LifecycleState};
use inkweave_core::error::{Error, ServiceError, StoreError};
use inkweave_core::event::DomainEvent;
use inkweave_core::narrative::{Blueprint, NarrativeUnit, UnitId};
use inkweave_core::service::{GenerationRequest, GenerationResponse, GenerationService};
use inkweave_core::store::{GraphNode, GraphRelationship, GraphStore, NodeFilter, TraversalQuery};
use inkweave_engine::{Orchestrator, REDUCE_AI_PHRASING};
use inkweave_memory::{MemoryCoordinator, NoopStore, TtlCache};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ── Scripted generator ──────────────────────────────────────────────────

/// Returns pre-scripted replies in order and records every request.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Result<String, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn texts(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn directives_of(&self, call: usize) -> Vec<String> {
        let requests = self.requests.lock().unwrap();
        serde_json::from_value(requests[call].context["directives"].clone()).unwrap()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::NotConfigured("script exhausted".into())));
        reply.map(GenerationResponse::text)
    }
}

/// Sleeps before answering and tracks how many calls overlap.
struct SlowGenerator {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowGenerator {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GenerationService for SlowGenerator {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GenerationResponse::text("Mara watched the boats come in."))
    }
}

/// Cancels the run from inside the first call, then errors.
struct CancellingGenerator {
    cancel: CancellationToken,
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationService for CancellingGenerator {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Err(ServiceError::Network("connection reset".into()))
    }
}

// ── Failing graph store ─────────────────────────────────────────────────

struct FailingGraph;

fn down() -> StoreError {
    StoreError::Unavailable {
        backend: "graph".into(),
        reason: "connection refused".into(),
    }
}

#[async_trait]
impl GraphStore for FailingGraph {
    fn name(&self) -> &str {
        "failing"
    }
    async fn upsert_node(&self, _node: GraphNode) -> Result<(), StoreError> {
        Err(down())
    }
    async fn get_node(&self, _label: &str, _id: &str) -> Result<Option<GraphNode>, StoreError> {
        Err(down())
    }
    async fn delete_node(&self, _label: &str, _id: &str) -> Result<bool, StoreError> {
        Err(down())
    }
    async fn find_nodes(&self, _label: &str, _filter: &NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        Err(down())
    }
    async fn relate(&self, _relationship: GraphRelationship) -> Result<(), StoreError> {
        Err(down())
    }
    async fn traverse(&self, _query: &TraversalQuery) -> Result<Vec<GraphNode>, StoreError> {
        Err(down())
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

const CLEAN: &str = "Mara waited alone by the cold stove.";
const HAUNTED: &str = "Mara turned. Ilya stood in the doorway.";
const FLAT: &str = "The cat sat. The cat sat. The cat sat.";
const VARIED: &str =
    "Rain. The old harbor woke slowly under a bruised grey sky while gulls argued over nets. She ran!";

/// Mara alive, Ilya deceased.
async fn seeded_memory() -> Arc<MemoryCoordinator> {
    let memory = Arc::new(MemoryCoordinator::in_memory(&CacheConfig::default()));
    memory.put_entity("saga", &EntityProfile::new("Mara")).await.unwrap();
    memory
        .put_entity(
            "saga",
            &EntityProfile::new("Ilya").with_lifecycle(LifecycleState::Deceased),
        )
        .await
        .unwrap();
    memory
}

/// Detectability never rejects, so only continuity and service errors do.
fn lenient() -> OrchestratorConfig {
    OrchestratorConfig {
        detectability_threshold: 100.0,
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(
    memory: Arc<MemoryCoordinator>,
    generator: Arc<dyn GenerationService>,
    settings: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::builder()
        .memory(memory)
        .generator(generator)
        .settings(settings)
        .build()
        .unwrap()
}

fn scene() -> Blueprint {
    Blueprint::new("Mara keeps vigil").with_entities(["Mara"])
}

fn drain(rx: &mut broadcast::Receiver<Arc<DomainEvent>>) -> Vec<Arc<DomainEvent>> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Continuity retries ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn deceased_entity_is_retried_until_clean() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[HAUNTED, HAUNTED, CLEAN]);
    let orch = orchestrator(memory.clone(), generator.clone(), lenient());
    let mut rx = orch.events().subscribe();
    let unit = UnitId::new("saga", 1, 1);

    let outcome = orch
        .generate_unit(&unit, &scene(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.retries, 2);
    assert_eq!(outcome.content(), CLEAN);
    assert_eq!(outcome.continuity_score, 100.0);
    assert_eq!(generator.call_count(), 3);

    // The lifecycle fix was fed back, once, from the second attempt on.
    assert!(generator.directives_of(0).is_empty());
    let directives = generator.directives_of(2);
    assert_eq!(directives.len(), 1);
    assert!(directives[0].contains("Ilya"));
    assert_eq!(outcome.directives, directives);

    let decisions: Vec<_> = outcome.history.iter().map(|a| a.decision.clone()).collect();
    assert_eq!(
        decisions,
        vec![
            AttemptDecision::RetryContinuity { blocking_issues: 1 },
            AttemptDecision::RetryContinuity { blocking_issues: 1 },
            AttemptDecision::Accepted,
        ]
    );
    assert_eq!(outcome.history[0].continuity_score, Some(75.0));

    let stored = memory.unit(&unit).await.unwrap();
    assert_eq!(stored.content, CLEAN);
    assert!(stored.entities.contains("Mara"));
    assert!(!stored.entities.contains("Ilya"));

    let events = drain(&mut rx);
    let rejected = events
        .iter()
        .filter(|e| matches!(e.as_ref(), DomainEvent::AttemptRejected { .. }))
        .count();
    assert_eq!(rejected, 2);
    assert!(matches!(
        events.last().map(|e| e.as_ref()),
        Some(DomainEvent::UnitAccepted { attempts: 3, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_fail_with_report() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[HAUNTED, HAUNTED, HAUNTED]);
    let orch = orchestrator(memory.clone(), generator.clone(), lenient());
    let mut rx = orch.events().subscribe();
    let unit = UnitId::new("saga", 1, 1);

    let err = orch
        .generate_unit(&unit, &scene(), &CancellationToken::new())
        .await
        .unwrap_err();

    let Error::ContinuityFailure(report) = &err else {
        panic!("expected a continuity failure, got {err:?}");
    };
    assert_eq!(report.attempts, 3);
    assert_eq!(report.retries(), 3);
    assert_eq!(report.history.len(), 3);
    assert_eq!(report.history[2].decision, AttemptDecision::Failed);
    assert_eq!(report.continuity_score, 75.0);
    assert!(report.issues.iter().any(|i| i.message.contains("Ilya")));
    assert!(err.is_retryable());

    assert!(memory.unit(&unit).await.is_none());
    let events = drain(&mut rx);
    assert!(matches!(
        events.last().map(|e| e.as_ref()),
        Some(DomainEvent::UnitFailed { attempts: 3, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_between_attempts() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[HAUNTED, HAUNTED, CLEAN]);
    let orch = orchestrator(memory, generator, lenient());

    let started = tokio::time::Instant::now();
    orch.generate_unit(&UnitId::new("saga", 1, 1), &scene(), &CancellationToken::new())
        .await
        .unwrap();
    // 1s after the first rejection, 2s after the second.
    assert!(started.elapsed() >= Duration::from_millis(3000));
}

// ── Detectability retries ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn detectable_text_gets_phrasing_directive() {
    let memory = Arc::new(MemoryCoordinator::in_memory(&CacheConfig::default()));
    let generator = ScriptedGenerator::texts(&[FLAT, VARIED]);
    let settings = OrchestratorConfig {
        detectability_threshold: 50.0,
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(memory, generator.clone(), settings);

    let outcome = orch
        .generate_unit(
            &UnitId::new("saga", 1, 1),
            &Blueprint::new("rain over the harbor"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.retries, 1);
    assert!(outcome.detectability_score <= 50.0);
    assert!(matches!(
        outcome.history[0].decision,
        AttemptDecision::RetryDetectability { .. }
    ));
    assert_eq!(generator.directives_of(1), vec![REDUCE_AI_PHRASING.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn detectability_failure_after_last_attempt() {
    let memory = Arc::new(MemoryCoordinator::in_memory(&CacheConfig::default()));
    let generator = ScriptedGenerator::texts(&[FLAT, FLAT]);
    let settings = OrchestratorConfig {
        max_attempts: 2,
        detectability_threshold: 50.0,
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(memory, generator, settings);

    let err = orch
        .generate_unit(
            &UnitId::new("saga", 1, 1),
            &Blueprint::new("a cat"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let Error::DetectabilityFailure(report) = err else {
        panic!("expected a detectability failure");
    };
    assert_eq!(report.attempts, 2);
    assert_eq!(report.detectability_threshold, 50.0);
    assert!(report.detectability_score > 50.0);
}

// ── Service errors ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn service_error_is_retried() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::new(vec![
        Err(ServiceError::RateLimited { retry_after_secs: 1 }),
        Ok(CLEAN.to_string()),
    ]);
    let orch = orchestrator(memory, generator.clone(), lenient());

    let outcome = orch
        .generate_unit(&UnitId::new("saga", 1, 1), &scene(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.retries, 1);
    assert!(!outcome.history[0].was_evaluated());
    assert!(matches!(
        outcome.history[0].decision,
        AttemptDecision::RetryServiceError { .. }
    ));
    // A service error alone adds no directives.
    assert!(generator.directives_of(1).is_empty());
}

#[tokio::test(start_paused = true)]
async fn persistent_service_errors_fail_the_unit() {
    let memory = seeded_memory().await;
    let network = || Err(ServiceError::Network("unreachable".into()));
    let generator = ScriptedGenerator::new(vec![network(), network(), network()]);
    let orch = orchestrator(memory, generator.clone(), lenient());

    let err = orch
        .generate_unit(&UnitId::new("saga", 1, 1), &scene(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::GenerationServiceFailure {
            attempts,
            source,
            last_evaluated,
        } => {
            assert_eq!(attempts, 3);
            assert!(matches!(source, ServiceError::Network(_)));
            assert!(last_evaluated.is_none());
        }
        other => panic!("expected a service failure, got {other:?}"),
    }
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let memory = seeded_memory().await;
    let settings = OrchestratorConfig {
        max_attempts: 1,
        generation_timeout_ms: 500,
        ..lenient()
    };
    let orch = orchestrator(memory, SlowGenerator::new(Duration::from_secs(10)), settings);

    let err = orch
        .generate_unit(&UnitId::new("saga", 1, 1), &scene(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::GenerationServiceFailure {
            source: ServiceError::Timeout(_),
            ..
        }
    ));
}

// ── Non-retryable failures ──────────────────────────────────────────────

#[tokio::test]
async fn unreadable_window_fails_without_generating() {
    let memory = Arc::new(MemoryCoordinator::new(
        Arc::new(FailingGraph),
        Arc::new(NoopStore),
        Arc::new(NoopStore),
        Arc::new(TtlCache::from_config(&CacheConfig::default())),
    ));
    let generator = ScriptedGenerator::texts(&[CLEAN]);
    let orch = orchestrator(memory, generator.clone(), lenient());
    let mut rx = orch.events().subscribe();

    let err = orch
        .generate_unit(&UnitId::new("saga", 1, 1), &scene(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ContextUnavailable(_)));
    assert!(!err.is_retryable());
    assert_eq!(generator.call_count(), 0);
    assert!(matches!(
        drain(&mut rx).last().map(|e| e.as_ref()),
        Some(DomainEvent::UnitFailed { attempts: 0, .. })
    ));
}

#[tokio::test]
async fn cancelled_before_start() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[CLEAN]);
    let orch = orchestrator(memory, generator.clone(), lenient());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orch
        .generate_unit(&UnitId::new("saga", 1, 1), &scene(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_during_backoff() {
    let memory = seeded_memory().await;
    let cancel = CancellationToken::new();
    let generator = Arc::new(CancellingGenerator {
        cancel: cancel.clone(),
        calls: AtomicUsize::new(0),
    });
    let orch = orchestrator(memory.clone(), generator.clone(), lenient());
    let unit = UnitId::new("saga", 1, 1);

    let err = orch.generate_unit(&unit, &scene(), &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert!(memory.unit(&unit).await.is_none());
}

// ── Chapters and ordering ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn chapter_stops_at_first_failure() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::new(vec![
        Ok(CLEAN.to_string()),
        Err(ServiceError::Network("down".into())),
    ]);
    let settings = OrchestratorConfig {
        max_attempts: 1,
        ..lenient()
    };
    let orch = orchestrator(memory.clone(), generator.clone(), settings);
    let blueprints = vec![scene(), scene(), scene()];

    let report = orch
        .generate_chapter("saga", 1, &blueprints, &CancellationToken::new())
        .await;

    assert!(!report.is_complete());
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].unit.id, UnitId::new("saga", 1, 1));
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.unit, UnitId::new("saga", 1, 2));
    assert!(matches!(failure.error, Error::GenerationServiceFailure { .. }));

    // The third unit was never attempted.
    assert_eq!(generator.call_count(), 2);
    assert!(memory.unit(&UnitId::new("saga", 1, 1)).await.is_some());
    assert!(memory.unit(&UnitId::new("saga", 1, 2)).await.is_none());

    // Unit 2 saw unit 1 in its continuity window.
    let requests = generator.requests.lock().unwrap();
    let window = requests[1].context["context"]["continuity_window"]
        .as_array()
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0]["content"], CLEAN);
}

#[tokio::test(start_paused = true)]
async fn complete_chapter_numbers_units_from_one() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[CLEAN, CLEAN]);
    let orch = orchestrator(memory, generator, lenient());

    let report = orch
        .generate_chapter("saga", 4, &[scene(), scene()], &CancellationToken::new())
        .await;

    assert!(report.is_complete());
    let ids: Vec<u32> = report.accepted.iter().map(|o| o.unit.id.unit).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(orch.tracked_chapters(), 0);
}

#[tokio::test(start_paused = true)]
async fn same_chapter_units_never_overlap() {
    let memory = seeded_memory().await;
    let generator = SlowGenerator::new(Duration::from_millis(200));
    let orch = orchestrator(memory, generator.clone(), lenient());
    let cancel = CancellationToken::new();
    let bp = scene();

    let first = UnitId::new("saga", 1, 1);
    let second = UnitId::new("saga", 1, 2);
    let (a, b) = tokio::join!(
        orch.generate_unit(&first, &bp, &cancel),
        orch.generate_unit(&second, &bp, &cancel),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(generator.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn later_unit_started_first_waits_for_its_predecessor() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::texts(&[CLEAN, CLEAN]);
    let orch = orchestrator(memory, generator.clone(), lenient());
    let cancel = CancellationToken::new();
    let bp = scene();

    let first = UnitId::new("saga", 1, 1);
    let second = UnitId::new("saga", 1, 2);
    let (b, a) = tokio::join!(
        orch.generate_unit(&second, &bp, &cancel),
        orch.generate_unit(&first, &bp, &cancel),
    );
    assert_eq!(a.unwrap().unit.id, first);
    assert_eq!(b.unwrap().unit.id, second);

    let requests = generator.requests.lock().unwrap();
    assert!(requests[0].task.starts_with("Write unit 1 of chapter 1."));
    assert!(requests[1].task.starts_with("Write unit 2 of chapter 1."));
    let window = requests[1].context["context"]["continuity_window"]
        .as_array()
        .unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0]["content"], CLEAN);
    assert_eq!(orch.tracked_chapters(), 0);
}

#[tokio::test(start_paused = true)]
async fn persisted_predecessor_does_not_block() {
    let memory = seeded_memory().await;
    memory
        .put_unit(&NarrativeUnit::new(UnitId::new("saga", 1, 1), CLEAN))
        .await
        .unwrap();
    let generator = ScriptedGenerator::texts(&[CLEAN]);
    let orch = orchestrator(memory, generator.clone(), lenient());

    let outcome = orch
        .generate_unit(&UnitId::new("saga", 1, 2), &scene(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.unit.id.unit, 2);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_predecessor_releases_the_next_unit() {
    let memory = seeded_memory().await;
    let generator = ScriptedGenerator::new(vec![
        Err(ServiceError::Network("down".into())),
        Ok(CLEAN.to_string()),
    ]);
    let settings = OrchestratorConfig {
        max_attempts: 1,
        ..lenient()
    };
    let orch = orchestrator(memory, generator.clone(), settings);
    let cancel = CancellationToken::new();
    let bp = scene();

    let id2 = UnitId::new("saga", 1, 2);
    let id1 = UnitId::new("saga", 1, 1);
    let (b, a) = tokio::join!(
        orch.generate_unit(&id2, &bp, &cancel),
        orch.generate_unit(&id1, &bp, &cancel),
    );
    assert!(a.is_err());
    assert_eq!(b.unwrap().unit.id.unit, 2);
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn waiting_on_missing_predecessor_is_cancellable() {
    let generator = ScriptedGenerator::texts(&[CLEAN]);
    let orch = orchestrator(seeded_memory().await, generator.clone(), lenient());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let err = orch
        .generate_unit(&UnitId::new("saga", 1, 3), &scene(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(generator.call_count(), 0);
    assert_eq!(orch.tracked_chapters(), 0);
}

#[tokio::test(start_paused = true)]
async fn different_chapters_run_concurrently() {
    let memory = seeded_memory().await;
    let generator = SlowGenerator::new(Duration::from_millis(200));
    let orch = orchestrator(memory, generator.clone(), lenient());
    let cancel = CancellationToken::new();
    let bp = scene();

    let one = UnitId::new("saga", 1, 1);
    let two = UnitId::new("saga", 2, 1);
    let (a, b) = tokio::join!(
        orch.generate_unit(&one, &bp, &cancel),
        orch.generate_unit(&two, &bp, &cancel),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(generator.peak.load(Ordering::SeqCst), 2);
}
