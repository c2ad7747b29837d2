//! The assembled context handed to generation and evaluation.

use crate::entity::EntityProfile;
use crate::narrative::{NarrativeUnit, UnitId};
use crate::thread::PlotThread;
use crate::world::{LocationRecord, WorldRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bounded context for generating one unit.
///
/// Everything except `metadata` is serialized when estimating size and
/// when sent to the generation service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub unit: UnitId,
    /// Most recent preceding units, oldest first.
    pub continuity_window: Vec<NarrativeUnit>,
    /// Profiles for blueprint-referenced entities, keyed by name.
    pub entities: BTreeMap<String, EntityProfile>,
    pub threads: Vec<PlotThread>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationRecord>,
    /// Style references, most similar first.
    #[serde(default)]
    pub similar_units: Vec<NarrativeUnit>,
    #[serde(default)]
    pub world_rules: Vec<WorldRule>,
    /// Every entity name known to the project.
    #[serde(default)]
    pub known_entities: Vec<String>,
    /// Every location name known to the project.
    #[serde(default)]
    pub known_locations: Vec<String>,
    /// Names and aliases of the project's deceased entities.
    #[serde(default)]
    pub known_deceased: Vec<String>,
    #[serde(default)]
    pub research_notes: Vec<String>,
    #[serde(skip)]
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    /// Look up a thread by id.
    pub fn thread(&self, id: &str) -> Option<&PlotThread> {
        self.threads.iter().find(|t| t.id == id)
    }
}

/// One of the fixed-order truncation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStep {
    SimilarUnits,
    ContinuityWindow,
    EntityDetail,
    PlotThreads,
}

impl TruncationStep {
    /// All steps in the order they are applied.
    pub const ORDER: [TruncationStep; 4] = [
        TruncationStep::SimilarUnits,
        TruncationStep::ContinuityWindow,
        TruncationStep::EntityDetail,
        TruncationStep::PlotThreads,
    ];
}

impl fmt::Display for TruncationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SimilarUnits => "similar_units",
            Self::ContinuityWindow => "continuity_window",
            Self::EntityDetail => "entity_detail",
            Self::PlotThreads => "plot_threads",
        };
        f.write_str(s)
    }
}

/// Size accounting for one assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimate before any truncation.
    pub initial_tokens: usize,
    /// Estimate of the returned context.
    pub estimated_tokens: usize,
    pub budget: usize,
    /// Steps applied, in order.
    pub steps_applied: Vec<TruncationStep>,
    /// Estimate after each applied step, parallel to `steps_applied`.
    pub size_after_step: Vec<usize>,
    /// Still above budget after every step ran.
    pub over_budget: bool,
}

impl AssemblyMetadata {
    pub fn was_truncated(&self) -> bool {
        !self.steps_applied.is_empty()
    }

    /// Utilization as a percentage of the budget.
    pub fn utilization_pct(&self) -> f32 {
        if self.budget == 0 {
            return 0.0;
        }
        (self.estimated_tokens as f32 / self.budget as f32) * 100.0
    }
}
