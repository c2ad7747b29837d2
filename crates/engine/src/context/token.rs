//! Token estimation utilities.
//!
//! Uses a byte-based heuristic: ~4 bytes of serialized JSON per token.
//! The estimate only has to be consistent between assembly runs, not
//! exact for any particular tokenizer.

use inkweave_core::context::AssembledContext;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate the size of an assembled context as sent to the generator.
pub fn estimate_context_tokens(context: &AssembledContext) -> usize {
    let json = serde_json::to_string(context).unwrap_or_default();
    estimate_tokens(&json)
}
