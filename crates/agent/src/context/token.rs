//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. The context
//! window trusts the backend's own `usage` numbers; this estimate is only
//! the fallback for backends that do not report usage.

use kgagent_core::message::TurnRecord;

/// Per-message overhead for role name and delimiters in the wire format.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single record including per-message overhead.
pub fn estimate_record_tokens(record: &TurnRecord) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(&record.content)
}

/// Estimate tokens for a slice of records.
pub fn estimate_records_tokens(records: &[TurnRecord]) -> usize {
    records.iter().map(estimate_record_tokens).sum()
}
