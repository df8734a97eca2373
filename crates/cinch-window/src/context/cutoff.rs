//! Safe cutoff search.
//!
//! A cutoff `i` splits a history into `messages[..i]` (summarized) and
//! `messages[i..]` (preserved). A cutoff is safe when no assistant message
//! ends up on one side while a tool result answering one of its calls ends
//! up on the other: providers reject a tool result whose call is gone, and a
//! call without its result confuses the model.
//!
//! The search starts at `len - keep_count` and walks toward the front, so it
//! may summarize more than requested but never preserves fewer than
//! `keep_count` messages. Only assistant messages within `search_window`
//! positions of a candidate are inspected; the scan for their results runs
//! to the end of the history.
//!
//! A split pair is only detected when its assistant message lies within
//! `search_window` positions of the cutoff. Results that arrive more than
//! `search_window` messages after their call can end up on the other side;
//! raise the window for histories where tools answer that late.

use crate::Message;
use tracing::debug;

/// Find the largest safe cutoff at or below `len - keep_count`.
///
/// Returns 0 when the history is not longer than `keep_count` or when no
/// candidate is safe. 0 means "do not compact".
pub fn find_safe_cutoff(messages: &[Message], keep_count: usize, search_window: usize) -> usize {
    if messages.len() <= keep_count {
        return 0;
    }

    let target = messages.len() - keep_count;
    let found = (0..=target)
        .rev()
        .find(|&i| is_safe_cutoff(messages, i, search_window));

    match found {
        Some(i) => {
            if i != target {
                debug!("Cutoff moved from {target} to {i} to keep tool calls with their results");
            }
            i
        }
        None => {
            debug!("No safe cutoff at or below {target}; skipping compaction");
            0
        }
    }
}

/// Whether cutting at `cutoff` keeps every nearby tool call on the same side
/// as its results.
pub fn is_safe_cutoff(messages: &[Message], cutoff: usize, search_window: usize) -> bool {
    if cutoff >= messages.len() {
        return true;
    }

    let start = cutoff.saturating_sub(search_window);
    let end = (cutoff + search_window).min(messages.len());

    (start..end)
        .filter(|&i| messages[i].has_tool_calls())
        .all(|i| !separates_tool_pair(messages, i, cutoff))
}

/// Whether `cutoff` puts any result of the calls at `assistant_index` on the
/// other side from the assistant message.
fn separates_tool_pair(messages: &[Message], assistant_index: usize, cutoff: usize) -> bool {
    let call_ids = messages[assistant_index].tool_call_ids();
    let assistant_before = assistant_index < cutoff;

    messages
        .iter()
        .enumerate()
        .skip(assistant_index + 1)
        .filter(|(_, m)| m.answers_call().is_some_and(|id| call_ids.contains(&id)))
        .any(|(j, _)| (j < cutoff) != assistant_before)
}
