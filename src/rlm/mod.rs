//! Recursive Language Model (RLM) completion engine.
//!
//! Lets a model solve a task over a payload too large for its own context
//! window by driving a sandboxed Python REPL that holds the payload,
//! recursing into sub-model calls (`llm_query`/`llm_query_batched`) for
//! isolated sub-tasks, and terminating via an explicit `FINAL_VAR` directive.
//!
//! Entry points: [`complete`] (blocking) and [`acomplete`] (async). Everything
//! else here is an internal component wired together by
//! [`orchestrator::run_completion`].

pub mod config;
pub mod error;
pub mod helper;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod sandbox;
pub mod serializer;
pub mod telemetry;
pub mod transcript;
pub mod truncate;
pub mod usage;

use std::sync::Arc;

use serde_json::Value;

pub use config::{Configuration, ConfigurationBuilder, SandboxVariant};
pub use error::{RlmError, RlmResult};
pub use usage::UsageRecord;

/// Run one completion to termination, returning the rendered final answer
/// and the usage recorded across every depth it touched.
///
/// Thin async entry point; see [`complete`] for the blocking twin.
pub async fn acomplete(
    payload: Value,
    task: &str,
    configuration: Configuration,
) -> RlmResult<(String, UsageRecord)> {
    let configuration = Arc::new(configuration.with_env_overlay());
    let model = model::create_chat_model(&configuration.model);
    orchestrator::run_completion(&payload, task, configuration, model).await
}

/// Blocking wrapper around [`acomplete`].
///
/// Mirrors `llms/base_llm.rs`'s pairing of a synchronous `call` with an async
/// `acall`: when already inside a Tokio runtime this runs on a blocking
/// thread via `tokio::task::block_in_place` + `Handle::block_on`; otherwise
/// it builds a current-thread runtime for the duration of the call. Never
/// duplicates orchestrator logic between the sync and async entry points.
pub fn complete(
    payload: Value,
    task: &str,
    configuration: Configuration,
) -> RlmResult<(String, UsageRecord)> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| {
            handle.block_on(acomplete(payload, task, configuration))
        }),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| RlmError::SandboxStartup {
                    message: format!("failed to start completion runtime: {e}"),
                })?;
            runtime.block_on(acomplete(payload, task, configuration))
        }
    }
}
