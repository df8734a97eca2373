//! Fit a message span into the summarization token budget.
//!
//! The span handed to the summary model can be far larger than the model
//! accepts. [`trim_messages`] keeps the most recent messages that fit,
//! includes the trailing lines of the first message that doesn't fit, pins
//! a leading system message, and finally drops messages from the old end
//! until the kept span starts on a user turn.

use crate::context::budget::TokenCounter;
use crate::error::TrimError;
use crate::{Message, MessageRole};

/// Keep the newest messages of `messages` that fit `max_tokens`.
///
/// Returns an empty list when nothing fits or when no user message survives
/// the budget; callers decide how to fall back. Fails only when the counter
/// charges more than `max_tokens` for an empty sequence.
pub fn trim_messages(
    messages: &[Message],
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<Vec<Message>, TrimError> {
    let baseline = counter.count(&[]);
    if baseline > max_tokens {
        return Err(TrimError::BaselineExceedsLimit {
            baseline,
            limit: max_tokens,
        });
    }
    if messages.is_empty() {
        return Ok(Vec::new());
    }

    let pinned_system = messages[0].role == MessageRole::System;
    let body = if pinned_system {
        &messages[1..]
    } else {
        messages
    };

    // Priority order: pinned system first, then newest to oldest.
    let mut order: Vec<Message> = Vec::with_capacity(messages.len());
    if pinned_system {
        order.push(messages[0].clone());
    }
    order.extend(body.iter().rev().cloned());

    let mut kept = largest_fitting_prefix(&order, max_tokens, counter);
    if kept < order.len()
        && let Some(partial) =
            trailing_lines_that_fit(&order[..kept], &order[kept], max_tokens, counter)
    {
        order[kept] = partial;
        kept += 1;
    }
    order.truncate(kept);

    let (system, mut recent) = if pinned_system && !order.is_empty() {
        let rest = order.split_off(1);
        (order.pop(), rest)
    } else {
        (None, order)
    };
    recent.reverse();

    let Some(first_user) = recent.iter().position(|m| m.role == MessageRole::User) else {
        return Ok(Vec::new());
    };

    let mut trimmed = Vec::with_capacity(recent.len() - first_user + 1);
    trimmed.extend(system);
    trimmed.extend(recent.drain(first_user..));
    Ok(trimmed)
}

/// Largest `k` such that `order[..k]` fits. Relies on the counter being
/// monotonic; `k = 0` always fits once the baseline check passed.
fn largest_fitting_prefix(
    order: &[Message],
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> usize {
    let (mut lo, mut hi) = (0, order.len());
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if counter.count(&order[..mid]) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

/// Copy of `candidate` holding the longest suffix of its lines that still
/// fits alongside `kept`. `None` if the content is a single line or no
/// proper suffix fits.
fn trailing_lines_that_fit(
    kept: &[Message],
    candidate: &Message,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Option<Message> {
    let content = candidate.content.as_deref()?;
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if lines.len() < 2 {
        return None;
    }

    let mut candidate_span: Vec<Message> = kept.to_vec();
    candidate_span.push(candidate.clone());
    for skip in 1..lines.len() {
        let suffix = lines[skip..].concat();
        if let Some(last) = candidate_span.last_mut() {
            last.content = Some(suffix);
        }
        if counter.count(&candidate_span) <= max_tokens {
            return candidate_span.pop();
        }
    }
    None
}
