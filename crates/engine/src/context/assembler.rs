//! Context assembly: the bounded context handed to generation.
//!
//! Retrieval runs as independent concurrent fetches against the memory
//! coordinator:
//!
//! | Fetch | On failure |
//! |-------|------------|
//! | Continuity window | Assembly fails with `ContextUnavailable` |
//! | Entity profiles | Empty map |
//! | Plot threads | Empty list |
//! | Location | None |
//! | Similar units | Empty list |
//! | World rules / rosters | Empty |
//! | Research notes | Empty list |
//!
//! The result is then truncated to the configured budget (see
//! [`truncation`](crate::context::truncation)). Exceeding the budget is never
//! an error.

use crate::context::truncation::{TruncationLimits, truncate_to_budget};
use chrono::Utc;
use futures::future::join_all;
use inkweave_config::ContextConfig;
use inkweave_core::context::AssembledContext;
use inkweave_core::error::{Error, Result};
use inkweave_core::event::{DomainEvent, EventBus};
use inkweave_core::narrative::{Blueprint, UnitId};
use inkweave_core::service::{ResearchDepth, ResearchRequest, ResearchService};
use inkweave_memory::MemoryCoordinator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ContextAssembler {
    memory: Arc<MemoryCoordinator>,
    research: Option<Arc<dyn ResearchService>>,
    events: Option<Arc<EventBus>>,
    config: ContextConfig,
    limits: TruncationLimits,
}

impl ContextAssembler {
    pub fn new(memory: Arc<MemoryCoordinator>, config: ContextConfig) -> Self {
        Self {
            memory,
            research: None,
            events: None,
            config,
            limits: TruncationLimits::default(),
        }
    }

    /// Look up blueprint research topics through this service.
    pub fn with_research(mut self, research: Arc<dyn ResearchService>) -> Self {
        self.research = Some(research);
        self
    }

    /// Publish `ContextTruncated` events here.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_limits(mut self, limits: TruncationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn budget(&self) -> usize {
        self.config.token_budget
    }

    /// Assemble the context for `unit`.
    ///
    /// Fails only if the continuity window cannot be read or `cancel`
    /// fires first.
    pub async fn assemble(
        &self,
        unit: &UnitId,
        blueprint: &Blueprint,
        cancel: &CancellationToken,
    ) -> Result<AssembledContext> {
        let mut context = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            fetched = self.fetch(unit, blueprint) => fetched?,
        };

        truncate_to_budget(&mut context, self.config.token_budget, &self.limits);
        let meta = &context.metadata;
        if meta.was_truncated() {
            debug!(
                unit = %unit,
                initial = meta.initial_tokens,
                estimated = meta.estimated_tokens,
                steps = meta.steps_applied.len(),
                utilization_pct = meta.utilization_pct(),
                "Context truncated"
            );
            if let Some(events) = &self.events {
                events.publish(DomainEvent::ContextTruncated {
                    unit: unit.to_string(),
                    initial_tokens: meta.initial_tokens,
                    final_tokens: meta.estimated_tokens,
                    steps: meta.steps_applied.clone(),
                    over_budget: meta.over_budget,
                    timestamp: Utc::now(),
                });
            }
        }
        if meta.over_budget {
            warn!(
                unit = %unit,
                estimated = meta.estimated_tokens,
                budget = meta.budget,
                utilization_pct = meta.utilization_pct(),
                "Context still over budget after every truncation step"
            );
        }
        Ok(context)
    }

    async fn fetch(&self, unit: &UnitId, blueprint: &Blueprint) -> Result<AssembledContext> {
        let project = unit.project_id.as_str();
        let memory = &self.memory;

        let window = memory.recent_units(unit, self.config.window_size);
        let entities = join_all(blueprint.expected_entities.iter().map(|name| async move {
            memory
                .entity_profile(project, name)
                .await
                .map(|profile| (name.clone(), profile))
        }));
        let threads = join_all(
            blueprint
                .thread_refs
                .iter()
                .map(|id| memory.plot_thread(project, id)),
        );
        let location = async {
            match blueprint.location.as_deref() {
                Some(name) => memory.location(project, name).await,
                None => None,
            }
        };
        // Over-fetch so units that end up in the window can be dropped.
        let similar = memory.similar_units(
            project,
            &blueprint.scene_goal,
            std::slice::from_ref(unit),
            self.config.similar_limit + self.config.window_size,
            self.config.similarity_threshold,
        );
        let rules = memory.world_rules(project);
        let roster = memory.roster(project);
        let research = self.research_notes(blueprint);

        let (window, entities, threads, location, similar, rules, roster, research) = futures::join!(
            window, entities, threads, location, similar, rules, roster, research
        );
        let window = window.map_err(Error::ContextUnavailable)?;

        let mut similar_units = similar;
        similar_units.retain(|s| window.iter().all(|w| w.id != s.id));
        similar_units.truncate(self.config.similar_limit);

        Ok(AssembledContext {
            unit: unit.clone(),
            continuity_window: window,
            entities: entities.into_iter().flatten().collect(),
            threads: threads.into_iter().flatten().collect(),
            location,
            similar_units,
            world_rules: rules.into_iter().filter(|r| r.active).collect(),
            known_entities: roster.entities,
            known_locations: roster.locations,
            known_deceased: roster.deceased,
            research_notes: research,
            metadata: Default::default(),
        })
    }

    async fn research_notes(&self, blueprint: &Blueprint) -> Vec<String> {
        let Some(research) = &self.research else {
            return Vec::new();
        };
        if blueprint.research_topics.is_empty() {
            return Vec::new();
        }

        let lookups = blueprint.research_topics.iter().map(|topic| {
            research.research(ResearchRequest {
                topic: topic.clone(),
                context: blueprint.scene_goal.clone(),
                depth: ResearchDepth::Standard,
                focus_areas: Vec::new(),
            })
        });

        let mut notes = Vec::new();
        for (topic, result) in blueprint.research_topics.iter().zip(join_all(lookups).await) {
            match result {
                Ok(response) => notes.extend(response.key_facts.into_iter().chain(response.insights)),
                Err(e) => warn!(topic = %topic, error = %e, "Research lookup failed, continuing without it"),
            }
        }
        notes.truncate(self.config.max_research_notes);
        notes
    }
}
