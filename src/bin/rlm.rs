//! RLM engine command-line entry point.
//!
//! A minimal ambient entry point, not a production server: reads a JSON
//! payload and a task string, runs one completion, and prints the answer.
//!
//! # Environment Variables
//!
//! - `RLM_MODEL`: primary model identifier (default: `gpt-4o-mini`)
//! - `RLM_DEEPER_MODELS`: comma-separated deeper model identifiers
//! - `RLM_LOG_DIR`: directory to persist the completion transcript
//! - `RLM_VERBOSE`: `1`/`true` to enable verbose logging
//! - `RUST_LOG`: tracing filter (default: "info,rlm_engine=debug")
//!
//! # Usage
//!
//! ```bash
//! echo '{"payload": "...", "task": "..."}' | cargo run --bin rlm
//! ```

use std::io::Read;

use serde::Deserialize;
use serde_json::Value;

use rlm_engine::rlm::{self, Configuration};

#[derive(Debug, Deserialize)]
struct CliInput {
    payload: Value,
    task: String,
}

#[tokio::main]
async fn main() {
    rlm::telemetry::init_tracing();

    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        tracing::error!("failed to read input from stdin");
        std::process::exit(1);
    }

    let input: CliInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(e) => {
            tracing::error!(error = %e, "input must be a JSON object with `payload` and `task`");
            std::process::exit(1);
        }
    };

    let model = std::env::var("RLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let deeper_models: Vec<String> = std::env::var("RLM_DEEPER_MODELS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let configuration = Configuration::builder(model)
        .deeper_models(deeper_models)
        .build();

    match rlm::acomplete(input.payload, &input.task, configuration).await {
        Ok((answer, usage)) => {
            tracing::info!(
                total_calls = usage.total_calls,
                total_prompt_tokens = usage.total_prompt_tokens,
                total_completion_tokens = usage.total_completion_tokens,
                "completion finished"
            );
            println!("{answer}");
        }
        Err(e) => {
            tracing::error!(error = %e, "completion failed");
            std::process::exit(1);
        }
    }
}
