//! # Inkweave Core
//!
//! Domain types, collaborator traits, and error definitions for the Inkweave
//! narrative generation pipeline. This crate has **no framework dependencies**;
//! it defines the model that the memory, quality, and engine crates build on.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (generation service, research service, graph,
//! vector, and document stores) is a trait here. Implementations live in
//! their respective crates, so tests can swap in in-memory or scripted
//! versions and the dependency graph points inward.

pub mod attempt;
pub mod context;
pub mod entity;
pub mod error;
pub mod event;
pub mod issue;
pub mod narrative;
pub mod service;
pub mod store;
pub mod thread;
pub mod world;

// Re-export key types at crate root for ergonomics
pub use attempt::{AttemptDecision, FailureReport, GenerationAttempt};
pub use context::{AssembledContext, AssemblyMetadata, TruncationStep};
pub use entity::{EntityProfile, EntityRole, LifecycleState, Relationship, VoiceProfile};
pub use error::{Error, Result, ServiceError, StoreError, ThreadTransitionError};
pub use event::{DomainEvent, EventBus};
pub use issue::{ContinuityIssue, IssueCategory, Severity};
pub use narrative::{Blueprint, CorrectionDirectives, NarrativeUnit, UnitId};
pub use service::{
    GenerationRequest, GenerationResponse, GenerationService, PostProcessor, ResearchRequest,
    ResearchResponse, ResearchService,
};
pub use store::{
    Collection, Document, DocumentStore, Embedder, GraphNode, GraphRelationship, GraphStore,
    RetrievalQuery, RetrievalStrategy, RetrievedDocument, VectorPoint, VectorStore,
};
pub use thread::{PlotThread, ThreadImportance, ThreadStatus};
pub use world::{LocationRecord, WorldRule};
