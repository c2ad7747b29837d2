//! The Inkweave generation engine.
//!
//! The engine follows an **Assemble → Generate → Evaluate** cycle per unit:
//!
//! 1. **Assemble** a bounded context from memory (window, entities,
//!    threads, location, style references, rules, research)
//! 2. **Generate** via the external generation service
//! 3. **Post-process** the raw text
//! 4. **Evaluate** continuity and detectability
//! 5. **Accept** and persist, or **retry** with correction directives
//!
//! Units within a chapter run strictly in order; chapters and projects
//! run independently.

pub mod context;
pub mod orchestrator;
pub mod postprocess;
pub mod sequencer;

pub use context::ContextAssembler;
pub use orchestrator::{
    ChapterFailure, ChapterReport, GenerationOutcome, Orchestrator, OrchestratorBuilder,
    PipelineState, REDUCE_AI_PHRASING,
};
pub use postprocess::TextCleanup;
pub use sequencer::{ChapterHandle, ChapterSequencer};
