//! Strict-budget truncation.
//!
//! Four steps run in a fixed order, each followed by a fresh estimate.
//! Truncation stops at the first step that brings the context within
//! budget; if all four run and it is still too large, the context is
//! returned as-is with `over_budget` set.

use crate::context::token::estimate_context_tokens;
use inkweave_core::context::{AssembledContext, AssemblyMetadata, TruncationStep};

/// Caps applied by each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationLimits {
    pub similar_units: usize,
    pub continuity_window: usize,
    pub relationships: usize,
    pub recent_mentions: usize,
    pub threads: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            similar_units: 2,
            continuity_window: 3,
            relationships: 3,
            recent_mentions: 2,
            threads: 3,
        }
    }
}

/// Apply one step in place.
pub fn apply_step(context: &mut AssembledContext, step: TruncationStep, limits: &TruncationLimits) {
    match step {
        TruncationStep::SimilarUnits => context.similar_units.truncate(limits.similar_units),
        TruncationStep::ContinuityWindow => {
            // Oldest first, so the most recent units are at the back.
            let excess = context
                .continuity_window
                .len()
                .saturating_sub(limits.continuity_window);
            context.continuity_window.drain(..excess);
        }
        TruncationStep::EntityDetail => {
            for profile in context.entities.values_mut() {
                profile.relationships.truncate(limits.relationships);
                profile.recent_mentions.truncate(limits.recent_mentions);
            }
        }
        TruncationStep::PlotThreads => {
            context.threads.sort_by_key(|t| t.importance);
            context.threads.truncate(limits.threads);
        }
    }
}

/// Shrink `context` toward `budget` and record what happened in its
/// metadata.
pub fn truncate_to_budget(context: &mut AssembledContext, budget: usize, limits: &TruncationLimits) {
    let initial = estimate_context_tokens(context);
    let mut meta = AssemblyMetadata {
        initial_tokens: initial,
        estimated_tokens: initial,
        budget,
        ..AssemblyMetadata::default()
    };

    for step in TruncationStep::ORDER {
        if meta.estimated_tokens <= budget {
            break;
        }
        apply_step(context, step, limits);
        meta.estimated_tokens = estimate_context_tokens(context);
        meta.steps_applied.push(step);
        meta.size_after_step.push(meta.estimated_tokens);
    }
    meta.over_budget = meta.estimated_tokens > budget;
    context.metadata = meta;
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkweave_core::entity::{EntityProfile, Relationship};
    use inkweave_core::narrative::{NarrativeUnit, UnitId};
    use inkweave_core::thread::{PlotThread, ThreadImportance};

    fn unit(n: u32, words: usize) -> NarrativeUnit {
        NarrativeUnit::new(UnitId::new("saga", 1, n), "tide ".repeat(words))
    }

    /// ~12000 tokens: a 10-unit window of ~800 each plus 10 similar units
    /// of ~400 each.
    fn oversized() -> AssembledContext {
        let mut ctx = AssembledContext::new(UnitId::new("saga", 1, 11));
        ctx.continuity_window = (1..=10).map(|n| unit(n, 620)).collect();
        ctx.similar_units = (1..=10).map(|n| unit(100 + n, 300)).collect();
        ctx
    }

    #[test]
    fn within_budget_is_untouched() {
        let mut ctx = AssembledContext::new(UnitId::new("saga", 1, 1));
        ctx.similar_units = vec![unit(1, 10); 4];
        truncate_to_budget(&mut ctx, 8000, &TruncationLimits::default());
        assert!(!ctx.metadata.was_truncated());
        assert_eq!(ctx.similar_units.len(), 4);
        assert_eq!(ctx.metadata.initial_tokens, ctx.metadata.estimated_tokens);
    }

    #[test]
    fn first_two_steps_suffice_for_oversized_window() {
        let mut ctx = oversized();
        let initial = estimate_context_tokens(&ctx);
        assert!((11_000..13_500).contains(&initial), "initial = {initial}");

        truncate_to_budget(&mut ctx, 8000, &TruncationLimits::default());
        let meta = &ctx.metadata;
        assert_eq!(
            meta.steps_applied,
            vec![TruncationStep::SimilarUnits, TruncationStep::ContinuityWindow]
        );
        assert!(meta.estimated_tokens <= 8000);
        assert!(!meta.over_budget);
        assert!(meta.utilization_pct() <= 100.0);
        assert_eq!(ctx.similar_units.len(), 2);

        let kept: Vec<u32> = ctx.continuity_window.iter().map(|u| u.id.unit).collect();
        assert_eq!(kept, vec![8, 9, 10]);
    }

    #[test]
    fn sizes_never_grow_between_steps() {
        let mut ctx = oversized();
        truncate_to_budget(&mut ctx, 10, &TruncationLimits::default());
        let meta = &ctx.metadata;
        assert_eq!(meta.steps_applied.len(), 4);
        assert!(meta.over_budget);
        assert!(meta.utilization_pct() > 100.0);
        let mut previous = meta.initial_tokens;
        for size in &meta.size_after_step {
            assert!(*size <= previous);
            previous = *size;
        }
    }

    #[test]
    fn entity_detail_caps_relationships_and_mentions() {
        let mut ctx = AssembledContext::new(UnitId::new("saga", 1, 1));
        let mut profile = EntityProfile::new("Mara");
        for i in 0..6 {
            profile = profile.with_relationship(Relationship::new(format!("E{i}"), "knows"));
            profile.recent_mentions.push(format!("mention {i}"));
        }
        ctx.entities.insert("Mara".into(), profile);

        apply_step(&mut ctx, TruncationStep::EntityDetail, &TruncationLimits::default());
        let mara = &ctx.entities["Mara"];
        assert_eq!(mara.relationships.len(), 3);
        assert_eq!(mara.recent_mentions.len(), 2);
    }

    #[test]
    fn thread_step_keeps_most_important() {
        let mut ctx = AssembledContext::new(UnitId::new("saga", 1, 1));
        ctx.threads = vec![
            PlotThread::new("t1", "one").with_importance(ThreadImportance::Tertiary),
            PlotThread::new("t2", "two").with_importance(ThreadImportance::Primary),
            PlotThread::new("t3", "three").with_importance(ThreadImportance::Secondary),
            PlotThread::new("t4", "four").with_importance(ThreadImportance::Tertiary),
            PlotThread::new("t5", "five").with_importance(ThreadImportance::Primary),
        ];
        apply_step(&mut ctx, TruncationStep::PlotThreads, &TruncationLimits::default());
        let ids: Vec<&str> = ctx.threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t5", "t3"]);
    }
}
