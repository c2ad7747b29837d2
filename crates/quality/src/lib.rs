//! # Inkweave Quality
//!
//! Scores a generated unit against its assembled context and blueprint.
//!
//! The evaluator runs seven independent continuity checks concurrently
//! and produces two numbers: a continuity score (100 minus severity
//! weights) and a detectability score (lower is better). Everything here
//! is deterministic and makes no external calls.

pub mod checks;
pub mod detectability;
pub mod evaluator;
pub mod heuristics;
pub mod scoring;
pub mod text;

pub use checks::{CheckInput, QualityCheck};
pub use detectability::{DetectabilityMetrics, detectability_score};
pub use evaluator::{Evaluation, EvaluatorBuilder, QualityEvaluator};
pub use heuristics::{LocationDetector, ResolutionDetector, ToneDetector, WorldRuleChecker};
pub use scoring::{continuity_score, has_blocking};
