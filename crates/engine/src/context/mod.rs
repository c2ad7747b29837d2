//! Budget-aware context assembly.
//!
//! # Truncation order
//!
//! | Step | Action |
//! |------|--------|
//! | 1. Similar units | Keep at most 2 style references |
//! | 2. Continuity window | Keep the 3 most recent units |
//! | 3. Entity detail | 3 relationships, 2 recent mentions per profile |
//! | 4. Plot threads | Keep the 3 most important |

pub mod assembler;
pub mod token;
pub mod truncation;

pub use assembler::ContextAssembler;
pub use token::{estimate_context_tokens, estimate_tokens};
pub use truncation::{TruncationLimits, apply_step, truncate_to_budget};
