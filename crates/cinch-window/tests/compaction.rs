//! Integration tests for the compaction pipeline.
//!
//! These drive [`Compactor::compact`] end to end with deterministic token
//! counters and in-process summary models, plus property tests for the
//! cutoff search and the retention shrink.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cinch_window::config::CompactionConfig;
use cinch_window::context::cutoff::find_safe_cutoff;
use cinch_window::context::retention::adjust_preserved;
use cinch_window::context::summarizer::SUMMARY_ERROR_PREFIX;
use cinch_window::context::{Compactor, FnSummaryModel};
use cinch_window::{Message, MessageRole, ToolCall};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Every message costs 1125 tokens, so 40 messages cost 45 000.
fn flat_1125(messages: &[Message]) -> usize {
    messages.len() * 1125
}

fn flat_100(messages: &[Message]) -> usize {
    messages.len() * 100
}

/// Alternating user/assistant turns tagged `<turn NN>`.
fn chat(n: usize) -> Vec<Message> {
    (0..n)
        .map(|i| {
            let text = format!("<turn {i:02}>");
            if i % 2 == 0 {
                Message::user(text)
            } else {
                Message::assistant_text(text)
            }
        })
        .collect()
}

/// A model that records every prompt it is given.
fn recording_model(prompts: Arc<Mutex<Vec<String>>>) -> FnSummaryModel {
    FnSummaryModel::new(move |prompt: String| {
        let prompts = prompts.clone();
        async move {
            prompts.lock().unwrap().push(prompt);
            Ok("condensed history".to_string())
        }
    })
}

/// A model that counts its calls.
fn counting_model(calls: Arc<AtomicUsize>) -> FnSummaryModel {
    FnSummaryModel::new(move |_prompt: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok("s".to_string()) }
    })
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn forty_messages_keep_fifteen() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let config = CompactionConfig::default()
        .with_trigger_threshold(30_000)
        .with_keep_count(15);
    let compactor = Compactor::new(config, flat_1125, recording_model(prompts.clone())).unwrap();

    let history = chat(40);
    let result = compactor.compact(&history).await.unwrap();

    // Cutoff lands on 25: turns 0..25 go to the model, 25.. are kept.
    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    for i in 0..25 {
        assert!(prompts[0].contains(&format!("<turn {i:02}>")), "turn {i} missing");
    }
    for i in 25..40 {
        assert!(!prompts[0].contains(&format!("<turn {i:02}>")), "turn {i} leaked");
    }

    // Budget: 30 000 - 1 125 summary, minus a 30% buffer, leaves 20 213.
    // 15 * 1 125 = 16 875 fits, so all 15 are kept.
    assert_eq!(result.len(), 16);
    assert_eq!(result[0].role, MessageRole::User);
    assert!(result[0].content.as_deref().unwrap().ends_with("condensed history"));
    let kept: Vec<_> = result[1..].iter().map(|m| m.content.clone()).collect();
    let expected: Vec<_> = history[25..].iter().map(|m| m.content.clone()).collect();
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn lower_threshold_shrinks_the_kept_tail() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let config = CompactionConfig::default()
        .with_trigger_threshold(20_000)
        .with_keep_count(15);
    let compactor = Compactor::new(config, flat_1125, recording_model(prompts)).unwrap();

    let history = chat(40);
    let result = compactor.compact(&history).await.unwrap();

    // 20 000 - 1 125 = 18 875; 30% buffer 5 662 leaves 13 213, room for 11.
    assert_eq!(result.len(), 12);
    assert_eq!(result[1].content, history[29].content);
    assert_eq!(result.last().unwrap().content, history[39].content);
}

#[tokio::test]
async fn tool_pair_at_the_target_moves_the_cutoff_back() {
    let mut history = chat(30);
    history[24] = Message::assistant_tool_calls(vec![
        ToolCall::new("call_a", "read_file", r#"{"path":"a.rs"}"#),
        ToolCall::new("call_b", "read_file", r#"{"path":"b.rs"}"#),
    ]);
    history[25] = Message::tool_result("call_a", "fn a() {}");
    history[26] = Message::tool_result("call_b", "fn b() {}");

    let config = CompactionConfig::default()
        .with_trigger_threshold(2_000)
        .with_keep_count(5)
        .with_min_buffer(0);
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let compactor = Compactor::new(config, flat_100, recording_model(prompts.clone())).unwrap();

    assert_eq!(compactor.planned_cutoff(&history), 24);
    let result = compactor.compact(&history).await.unwrap();

    // The tool call and both results stay together in the kept tail.
    assert_eq!(result.len(), 7);
    assert!(result[1].has_tool_calls());
    assert_eq!(result[2].answers_call(), Some("call_a"));
    assert_eq!(result[3].answers_call(), Some("call_b"));
    assert!(!prompts.lock().unwrap()[0].contains("call_a"));
}

#[tokio::test]
async fn short_history_over_threshold_is_left_alone() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CompactionConfig::default()
        .with_trigger_threshold(1)
        .with_keep_count(20);
    let compactor = Compactor::new(config, flat_100, counting_model(calls.clone())).unwrap();

    assert!(compactor.compact(&chat(20)).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn below_threshold_never_calls_the_model() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = CompactionConfig::default()
        .with_trigger_threshold(30_000)
        .with_keep_count(15);
    let compactor = Compactor::new(config, flat_100, counting_model(calls.clone())).unwrap();

    // 40 * 100 = 4 000 tokens.
    assert!(compactor.compact(&chat(40)).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_model_yields_an_error_summary() {
    let model = FnSummaryModel::new(|_prompt: String| async {
        Err("429 Too Many Requests".to_string())
    });
    let config = CompactionConfig::default()
        .with_trigger_threshold(30_000)
        .with_keep_count(15);
    let compactor = Compactor::new(config, flat_1125, model).unwrap();

    let result = compactor.compact(&chat(40)).await.unwrap();
    let summary = result[0].content.as_deref().unwrap();
    assert!(summary.contains(SUMMARY_ERROR_PREFIX));
    assert!(summary.contains("429 Too Many Requests"));
    assert_eq!(result.len(), 16);
}

#[tokio::test]
async fn system_prompt_is_kept_in_the_summary_input() {
    let mut history = chat(40);
    history[0] = Message::system("<system rules>");
    let prompts = Arc::new(Mutex::new(Vec::new()));
    // Room for the system message plus 3 turns in the trim budget.
    let config = CompactionConfig::default()
        .with_trigger_threshold(30_000)
        .with_keep_count(15)
        .with_trim_limit(4 * 1125);
    let compactor = Compactor::new(config, flat_1125, recording_model(prompts.clone())).unwrap();

    compactor.compact(&history).await.unwrap();
    let prompt = &prompts.lock().unwrap()[0];
    assert!(prompt.contains("<system rules>"));
    assert!(!prompt.contains("<turn 01>"));
}

// ── Properties ──────────────────────────────────────────────────────

/// Search window used by the property tests.
const WINDOW: usize = 5;

#[derive(Debug, Clone)]
enum Segment {
    Text,
    /// One assistant call group. Each entry after the call is either the
    /// result for call `k` or an unrelated turn, in arbitrary order.
    Tools(Vec<Option<usize>>),
}

/// Results arrive out of order with unrelated turns in between, but always
/// within `WINDOW` positions of their call. Pairs further apart are outside
/// what the cutoff search checks; see the cutoff module tests.
fn tool_group() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1usize..=3, 0usize..=2).prop_flat_map(|(calls, gap)| {
        let mut tail: Vec<Option<usize>> = (0..calls).map(Some).collect();
        tail.extend(std::iter::repeat_n(None, gap));
        Just(tail).prop_shuffle()
    })
}

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![Just(Segment::Text), tool_group().prop_map(Segment::Tools)]
}

fn build_history(segments: &[Segment]) -> Vec<Message> {
    let mut out = Vec::new();
    let mut next_id = 0;
    for seg in segments {
        match seg {
            Segment::Text => out.push(Message::user(format!("text {}", out.len()))),
            Segment::Tools(tail) => {
                let ids: Vec<String> = tail
                    .iter()
                    .flatten()
                    .map(|_| {
                        next_id += 1;
                        format!("call_{next_id}")
                    })
                    .collect();
                let calls = ids
                    .iter()
                    .map(|id| ToolCall::new(id.clone(), "lookup", "{}"))
                    .collect();
                out.push(Message::assistant_tool_calls(calls));
                for entry in tail {
                    match entry {
                        Some(k) => out.push(Message::tool_result(ids[*k].clone(), "ok")),
                        None => out.push(Message::user(format!("meanwhile {}", out.len()))),
                    }
                }
            }
        }
    }
    out
}

fn splits_a_pair(messages: &[Message], cutoff: usize) -> bool {
    messages.iter().enumerate().any(|(i, m)| {
        m.tool_call_ids().iter().any(|id| {
            messages
                .iter()
                .enumerate()
                .any(|(j, r)| r.answers_call() == Some(*id) && (i < cutoff) != (j < cutoff))
        })
    })
}

fn by_content(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| m.content.as_ref().map_or(0, |c| c.len()))
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The chosen cutoff never separates a tool call from its results and
    /// never keeps fewer than `keep_count` messages, whatever the order of
    /// the results.
    #[test]
    fn prop_cutoff_keeps_tool_pairs_together(
        segments in prop::collection::vec(segment(), 1..40),
        keep_count in 0usize..25,
    ) {
        let history = build_history(&segments);
        let cutoff = find_safe_cutoff(&history, keep_count, WINDOW);

        prop_assert!(!splits_a_pair(&history, cutoff));
        if cutoff > 0 {
            prop_assert!(history.len() - cutoff >= keep_count);
        }
    }

    /// Compaction output is a summary followed by a suffix of the input
    /// taken at or after the cutoff.
    #[test]
    fn prop_compaction_keeps_a_suffix(
        segments in prop::collection::vec(segment(), 1..40),
        keep_count in 1usize..20,
    ) {
        let history = build_history(&segments);
        let config = CompactionConfig::default()
            .with_trigger_threshold(1_000)
            .with_keep_count(keep_count)
            .with_min_buffer(0);
        let compactor = Compactor::new(
            config,
            flat_100,
            FnSummaryModel::new(|_prompt: String| async { Ok("s".to_string()) }),
        )
        .unwrap();
        let cutoff = compactor.planned_cutoff(&history);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = runtime.block_on(compactor.compact(&history));

        match result {
            None => prop_assert!(history.len() * 100 < 1_000 || cutoff == 0),
            Some(result) => {
                prop_assert!(cutoff > 0);
                let kept = &result[1..];
                prop_assert!(kept.len() <= history.len() - cutoff);
                let suffix = &history[history.len() - kept.len()..];
                for (k, h) in kept.iter().zip(suffix) {
                    prop_assert_eq!(&k.content, &h.content);
                    prop_assert_eq!(&k.tool_call_id, &h.tool_call_id);
                }
            }
        }
    }

    /// The retention shrink returns the longest fitting suffix.
    #[test]
    fn prop_retention_returns_longest_fitting_suffix(
        sizes in prop::collection::vec(1usize..50, 0..30),
        budget in -10i64..600,
    ) {
        let preserved: Vec<Message> = sizes.iter().map(|&n| Message::user("x".repeat(n))).collect();
        let kept = adjust_preserved(&preserved, budget, &by_content);

        prop_assert!(kept.len() <= preserved.len());
        prop_assert_eq!(&kept[..], &preserved[preserved.len() - kept.len()..]);
        if !kept.is_empty() {
            prop_assert!(by_content(&kept) as i64 <= budget);
        }
        if kept.len() < preserved.len() {
            let one_more = &preserved[preserved.len() - kept.len() - 1..];
            prop_assert!(by_content(one_more) as i64 > budget);
        }
    }
}
