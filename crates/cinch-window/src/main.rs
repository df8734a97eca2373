//! Compact a saved conversation history.
//!
//! Reads a JSON array of messages, and if it has reached the trigger
//! threshold, summarizes the old turns through OpenRouter and writes the
//! replacement history as JSON. Reads the API key from the `OPENROUTER_KEY`
//! environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Compact a transcript, printing the new history to stdout
//! cinch-window --input history.json --threshold 30000 --keep 15
//!
//! # Only report usage and where the cut would land
//! cinch-window --input history.json --threshold 30000 --dry-run
//!
//! # Settings from a config file, history piped in
//! cat history.json | cinch-window --config compaction.json --output compacted.json
//! ```

use cinch_window::config::CompactionConfig;
use cinch_window::context::{
    ApproximateTokenCounter, Compactor, OpenRouterSummaryModel, SummarizerModelConfig,
};
use cinch_window::{Message, OpenRouterClient};
use clap::Parser;
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Compact a saved conversation history.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "cinch-window")]
struct Cli {
    // ── Input / output ─────────────────────────────────────────
    /// JSON file holding the message history. Reads stdin when omitted.
    #[arg(long)]
    input: Option<String>,

    /// Write the replacement history here instead of stdout
    #[arg(long)]
    output: Option<String>,

    // ── Budget ─────────────────────────────────────────────────
    /// JSON compaction config file
    #[arg(long)]
    config: Option<String>,

    /// Token count that triggers compaction (overrides the config file)
    #[arg(long)]
    threshold: Option<usize>,

    /// Minimum trailing messages to keep (overrides the config file)
    #[arg(long)]
    keep: Option<usize>,

    /// Characters per token for the approximate counter
    #[arg(long)]
    chars_per_token: Option<f64>,

    // ── Summary model ──────────────────────────────────────────
    /// Model used to write the summary
    #[arg(long, default_value = cinch_window::DEFAULT_MODEL)]
    model: String,

    /// Maximum tokens in the summary
    #[arg(long, default_value_t = 2048)]
    max_summary_tokens: u32,

    // ── Mode ───────────────────────────────────────────────────
    /// Report usage and the planned cutoff without calling the model
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli)?;
    let history = read_history(cli.input.as_deref())?;
    let counter = ApproximateTokenCounter::with_calibration(cli.chars_per_token);

    if cli.dry_run {
        let compactor = Compactor::new(config, counter, NoModel).map_err(|e| e.to_string())?;
        let usage = compactor.usage(&history);
        eprintln!("{} messages, {}", history.len(), usage.to_log_string());
        if usage.needs_compaction() {
            eprintln!(
                "compaction would summarize {} message(s)",
                compactor.planned_cutoff(&history)
            );
        } else {
            eprintln!("no compaction needed");
        }
        return Ok(());
    }

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;
    let model_config = SummarizerModelConfig {
        max_summary_tokens: cli.max_summary_tokens,
        ..SummarizerModelConfig::default().with_model(cli.model.clone())
    };
    let model = OpenRouterSummaryModel::new(client, model_config);
    let compactor = Compactor::new(config, counter, model).map_err(|e| e.to_string())?;

    let output = match compactor.compact(&history).await {
        Some(replacement) => replacement,
        None => {
            eprintln!("no compaction needed");
            history
        }
    };
    write_history(&output, cli.output.as_deref())
}

fn build_config(cli: &Cli) -> Result<CompactionConfig, String> {
    let mut config = match &cli.config {
        Some(path) => CompactionConfig::load(path)
            .map_err(|e| format!("config file '{path}': {e}"))?,
        None => CompactionConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config = config.with_trigger_threshold(threshold);
    }
    if let Some(keep) = cli.keep {
        config = config.with_keep_count(keep);
    }
    Ok(config)
}

fn read_history(path: Option<&str>) -> Result<Vec<Message>, String> {
    let content = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read history file '{path}': {e}"))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    serde_json::from_str(&content).map_err(|e| format!("failed to parse history: {e}"))
}

fn write_history(messages: &[Message], path: Option<&str>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(messages)
        .map_err(|e| format!("failed to serialize history: {e}"))?;
    match path {
        Some(path) => std::fs::write(path, json + "\n")
            .map_err(|e| format!("failed to write '{path}': {e}")),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

/// Stand-in model for `--dry-run`, which never summarizes.
struct NoModel;

impl cinch_window::context::SummaryModel for NoModel {
    fn complete(&self, _prompt: &str) -> cinch_window::context::summarizer::SummaryFuture<'_> {
        Box::pin(async { Err("dry run: no summary model".to_string()) })
    }
}
