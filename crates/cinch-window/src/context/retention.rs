//! Fit the preserved tail next to the summary.
//!
//! After summarization the preserved messages may still not fit: the summary
//! costs tokens too, and the next turn needs headroom. The free budget is
//! `threshold - summary_tokens`; a buffer is reserved from it and the
//! preserved tail is shrunk, oldest first and one whole message at a time,
//! until it fits what remains.

use crate::Message;
use crate::context::budget::TokenCounter;
use tracing::debug;

/// Token budget left for preserved messages once the summary and the
/// next-turn buffer are accounted for.
///
/// `None` when the summary alone reaches the threshold: nothing is kept.
/// Otherwise the budget may still be zero or negative, in which case only
/// messages the counter prices at zero can fit.
///
/// The buffer is `available * buffer_ratio`, clamped to at most
/// `available - min_buffer` and then to at least `min_buffer`, so a small
/// budget always reserves `min_buffer` even when that leaves nothing.
pub fn preserved_budget(
    threshold: usize,
    summary_tokens: usize,
    buffer_ratio: f64,
    min_buffer: usize,
) -> Option<i64> {
    let available = saturating_i64(threshold) - saturating_i64(summary_tokens);
    if available <= 0 {
        return None;
    }
    let min_buffer = saturating_i64(min_buffer);
    let proportional = (available as f64 * buffer_ratio) as i64;
    let buffer = proportional.min(available - min_buffer).max(min_buffer);
    Some(available - buffer)
}

/// Keep the longest trailing slice of `preserved` whose cost fits `budget`.
///
/// Tries the whole set first, then `len - 1`, ... down to 1 trailing
/// message; returns an empty list if not even the newest message fits.
pub fn adjust_preserved(
    preserved: &[Message],
    budget: i64,
    counter: &dyn TokenCounter,
) -> Vec<Message> {
    let fits = |slice: &[Message]| saturating_i64(counter.count(slice)) <= budget;

    if fits(preserved) {
        return preserved.to_vec();
    }

    for keep in (1..preserved.len()).rev() {
        let tail = &preserved[preserved.len() - keep..];
        if fits(tail) {
            debug!(
                "Shrunk preserved messages from {} to {keep} to fit {budget} tokens",
                preserved.len()
            );
            return tail.to_vec();
        }
    }

    debug!("No preserved message fits {budget} tokens; keeping only the summary");
    Vec::new()
}

fn saturating_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
