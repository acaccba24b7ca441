//! Completion Orchestrator: the main iteration loop driving one completion
//! from INIT through TERMINATING.
//!
//! Grounded on `agents/crew_agent_executor.rs`'s `invoke_loop_react`:
//! the bounded `while self.iterations < self.max_iter` loop and its
//! "exceeded maximum iterations" fatal error are the direct model for this
//! loop's iteration-budget enforcement; the state names below are this
//! engine's own, since `invoke_loop_react` does not expose a named state
//! machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::rlm::config::{BackendOptions, Configuration};
use crate::rlm::error::{BudgetKind, RlmError};
use crate::rlm::helper::HelperService;
use crate::rlm::model::ChatModel;
use crate::rlm::parser;
use crate::rlm::prompt;
use crate::rlm::sandbox::{self, SandboxSession, PAYLOAD_BINDING};
use crate::rlm::serializer;
use crate::rlm::transcript::{Transcript, Turn};
use crate::rlm::truncate;
use crate::rlm::usage::{UsageAggregator, UsageRecord};

/// Maximum number of transient model-call retries before treating the
/// failure as permanent.
const MAX_MODEL_RETRY_ATTEMPTS: u32 = 3;

/// Hard character cap applied if a truncated snippet output would still
/// exceed the threshold after the normal elision pass.
const HARD_OUTPUT_CAP_CHARS: usize = 20_000;

/// Run one completion at `depth` to termination.
///
/// `depth` is 0 for a caller-invoked completion; nested completions invoked
/// through the Helper Service pass their own depth, though in this engine's
/// chosen architecture (see `DESIGN.md`) helper calls are answered as direct
/// Model Adapter calls rather than nested completions, so `depth` is always
/// 0 at every call site reachable from [`crate::rlm::complete`]/`acomplete`.
pub async fn run_completion(
    payload: &Value,
    task: &str,
    config: Arc<Configuration>,
    model: Box<dyn ChatModel>,
) -> Result<(String, UsageRecord), RlmError> {
    let depth = 0u32;
    let deadline = Instant::now() + Duration::from_secs_f64(config.deadline_seconds.max(0.0));
    let usage = Arc::new(UsageAggregator::new());
    let helpers = HelperService::new(Arc::clone(&config), Arc::clone(&usage), depth);

    let (payload_json, descriptor) =
        serializer::serialize_payload(payload, config.max_payload_bytes)?;

    let mut sandbox = sandbox::create_sandbox(config.sandbox)?;
    let mut transcript = Transcript::new();

    let result = run_loop(
        sandbox.as_mut(),
        &helpers,
        &config,
        model.as_ref(),
        task,
        &payload_json,
        &descriptor,
        deadline,
        Arc::clone(&usage),
        &mut transcript,
    )
    .await;

    helpers.cancel();
    sandbox.terminate().await;

    if let Some(log_dir) = &config.log_dir {
        let completion_id = uuid::Uuid::new_v4().to_string();
        crate::rlm::telemetry::persist_transcript(log_dir, &completion_id, &transcript);
    }

    result.map(|answer| (answer, usage.snapshot()))
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    sandbox: &mut dyn SandboxSession,
    helpers: &HelperService,
    config: &Configuration,
    model: &dyn ChatModel,
    task: &str,
    payload_json: &[u8],
    descriptor: &serializer::ContextDescriptor,
    deadline: Instant,
    usage: Arc<UsageAggregator>,
    transcript: &mut Transcript,
) -> Result<String, RlmError> {
    // INIT -> READY
    sandbox
        .bootstrap(PAYLOAD_BINDING, payload_json, config.setup_code.as_deref())
        .await?;

    // READY -> AWAITING_MODEL: assemble initial transcript.
    transcript.push(Turn::system(prompt::build_system_prompt(
        PAYLOAD_BINDING,
        config.truncation_head_chars,
        config.truncation_tail_chars,
    )));
    transcript.push(Turn::user(prompt::build_initial_user_prompt(
        task, descriptor,
    )));

    let root_backend_id = config.backend_for_depth(0);
    let overrides = config.backend_options.get(root_backend_id);
    let mut consecutive_empty_replies = 0u32;

    for iteration in 0..config.max_iterations {
        check_deadline(deadline, transcript.len())?;

        let reply =
            call_model_with_retry(model, transcript, deadline, &usage, 0, overrides).await?;
        transcript.push(Turn::assistant(reply.clone()));

        check_token_budget(&usage, config.max_total_tokens, transcript.len())?;

        let parsed = parser::parse(&reply);

        if parsed.is_empty() {
            if consecutive_empty_replies >= 1 {
                return Err(RlmError::ProtocolViolation);
            }
            consecutive_empty_replies += 1;
            transcript.push(Turn::user(prompt::build_empty_reply_warning()));
            continue;
        }
        consecutive_empty_replies = 0;

        // AWAITING_SANDBOX: execute snippets in order, truncate, append.
        if !parsed.snippets.is_empty() {
            let mut combined_output = String::new();
            for snippet in &parsed.snippets {
                check_deadline(deadline, transcript.len())?;
                let result = sandbox.execute(&snippet.code, helpers).await?;
                combined_output.push_str(&render_execution_result(&result, config));
                combined_output.push('\n');
            }
            transcript.push(Turn::user(combined_output));
        }

        if let Some(directive) = parsed.final_directive {
            // FINALIZING: evaluate the named identifier.
            let result = sandbox.evaluate_identifier(&directive.identifier).await?;
            if result.completed_cleanly {
                return Ok(result.stdout);
            }
            transcript.push(Turn::user(prompt::build_missing_final_var_notice(
                &directive.identifier,
            )));
            continue;
        }

        transcript.push(Turn::user(prompt::build_continue_prompt(
            iteration + 1,
            config.max_iterations,
        )));
    }

    Err(RlmError::BudgetExhausted {
        kind: BudgetKind::Iterations,
        transcript_len: transcript.len(),
    })
}

/// Truncate one snippet's captured stdout/stderr and render it as the user
/// turn text shown to the model, applying the hard re-truncation cap when
/// elision alone was not enough.
fn render_execution_result(result: &sandbox::ExecutionResult, config: &Configuration) -> String {
    let mut rendered = String::new();
    if !result.stdout.is_empty() {
        rendered.push_str(&truncate::truncate(
            &result.stdout,
            config.truncation_head_chars,
            config.truncation_tail_chars,
        ));
    }
    if !result.completed_cleanly {
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str("[execution error]\n");
        rendered.push_str(&truncate::truncate(
            &result.stderr,
            config.truncation_head_chars,
            config.truncation_tail_chars,
        ));
    }

    if rendered.chars().count() > HARD_OUTPUT_CAP_CHARS {
        rendered = truncate::truncate(
            &rendered,
            HARD_OUTPUT_CAP_CHARS / 2,
            HARD_OUTPUT_CAP_CHARS / 2,
        );
    }
    rendered
}

fn check_deadline(deadline: Instant, transcript_len: usize) -> Result<(), RlmError> {
    if Instant::now() >= deadline {
        return Err(RlmError::BudgetExhausted {
            kind: BudgetKind::Deadline,
            transcript_len,
        });
    }
    Ok(())
}

/// Check the aggregate root-model (depth 0) prompt+completion token total
/// against the configured cap. Helper call usage at other depths is tracked
/// separately and does not count here.
fn check_token_budget(
    usage: &UsageAggregator,
    max_total_tokens: Option<u64>,
    transcript_len: usize,
) -> Result<(), RlmError> {
    if let Some(limit) = max_total_tokens {
        let snapshot = usage.snapshot();
        let root = snapshot.by_depth.first().copied().unwrap_or_default();
        let total = root.prompt_tokens + root.completion_tokens;
        if total >= limit {
            return Err(RlmError::BudgetExhausted {
                kind: BudgetKind::Tokens,
                transcript_len,
            });
        }
    }
    Ok(())
}

async fn call_model_with_retry(
    model: &dyn ChatModel,
    transcript: &Transcript,
    deadline: Instant,
    usage: &UsageAggregator,
    depth: u32,
    overrides: Option<&BackendOptions>,
) -> Result<String, RlmError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        check_deadline(deadline, transcript.len())?;
        let messages = transcript.as_messages();
        match model.chat(&messages, overrides).await {
            Ok(reply) => {
                usage.record(depth, reply.prompt_tokens, reply.completion_tokens);
                return Ok(reply.text);
            }
            Err(RlmError::ModelUnavailable { backend, message })
                if attempt < MAX_MODEL_RETRY_ATTEMPTS =>
            {
                tracing::debug!(attempt, backend, message, "retrying transient model call");
                let backoff_ms = 100u64 * 2u64.pow(attempt.min(6));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                continue;
            }
            Err(RlmError::ModelUnavailable { backend, message }) => {
                return Err(RlmError::ModelUnavailable { backend, message });
            }
            Err(other) => return Err(other),
        }
    }
}
