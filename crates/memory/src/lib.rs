//! Memory layer for Inkweave: the coordinator, its TTL cache and sweeper,
//! and the in-memory / no-op store backends.

pub mod cache;
pub mod coordinator;
pub mod in_memory;
pub mod noop;
pub mod sweeper;
pub mod vector;

pub use cache::{CacheStats, TtlCache};
pub use coordinator::{MemoryCoordinator, Roster};
pub use in_memory::{InMemoryDocumentStore, InMemoryGraphStore, InMemoryVectorStore};
pub use noop::NoopStore;
pub use sweeper::{CacheSweeper, SweeperHandle};
pub use vector::{HashingEmbedder, cosine_similarity, reciprocal_rank_fusion};
