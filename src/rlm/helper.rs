//! Helper Service: answers `llm_query`/`llm_query_batched` calls issued from
//! inside a running sandbox, with depth-based routing and bounded,
//! order-preserving batched concurrency.
//!
//! Grounded on `tools/tool_usage.rs`'s bounded-retry dispatch shape and on
//! the rand-loop retrieval-pack orchestrator's per-depth routing runtime,
//! adapted so dispatch goes straight to the Model Adapter rather than
//! through a generic tool-call surface: a helper request IS a one-turn chat
//! call at the backend selected for its depth, not a nested full completion
//! loop (see `DESIGN.md` for why recursion stops at the chat call).

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::rlm::config::{BackendOptions, Configuration};
use crate::rlm::error::RlmError;
use crate::rlm::model::{create_chat_model, ChatModel};
use crate::rlm::prompt::depth_capped_marker;
use crate::rlm::transcript::Role;
use crate::rlm::usage::UsageAggregator;

/// A helper request as it crosses the sandbox boundary (one frame body).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HelperRequestBody {
    kind: HelperKind,
    prompts: Vec<String>,
    #[serde(default)]
    overrides: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum HelperKind {
    Single,
    Batched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HelperResponseBody {
    texts: Vec<String>,
}

/// The raw, wire-level half of the Helper Service contract: parse a request
/// frame body, dispatch it, serialize a response frame body. Implemented by
/// [`HelperService`] for real dispatch and by [`NullHelperDispatch`] for
/// call sites (like `evaluate_identifier`) that never see helper traffic.
#[async_trait]
pub trait HelperDispatch: Send + Sync {
    async fn dispatch_raw(&self, request_json: &[u8]) -> Result<Vec<u8>, RlmError>;
}

/// A dispatcher that never expects to be called; used where the sandbox
/// protocol guarantees no helper traffic can occur (identifier evaluation).
pub struct NullHelperDispatch;

#[async_trait]
impl HelperDispatch for NullHelperDispatch {
    async fn dispatch_raw(&self, _request_json: &[u8]) -> Result<Vec<u8>, RlmError> {
        Err(RlmError::HelperDispatch {
            message: "no helper traffic is expected on this channel".to_string(),
        })
    }
}

/// Per-item retry budget for a transient backend failure inside a batch.
const MAX_PER_ITEM_ATTEMPTS: u32 = 3;

/// Single-process dispatcher owned by the Completion Orchestrator, answering
/// helper calls initiated inside its sandbox.
pub struct HelperService {
    config: Arc<Configuration>,
    usage: Arc<UsageAggregator>,
    /// The depth at which calls issued through this instance are recorded;
    /// captured at construction, not forgeable by code running in the sandbox.
    depth: u32,
    cancelled: Arc<std::sync::atomic::AtomicBool>,
}

impl HelperService {
    pub fn new(config: Arc<Configuration>, usage: Arc<UsageAggregator>, depth: u32) -> Self {
        Self {
            config,
            usage,
            depth,
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Mark this service (and all depths derived from it) as cancelled; new
    /// helper calls return early rather than issuing backend requests.
    pub fn cancel(&self) {
        self.cancelled
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Answer one prompt, retrying transient backend failures with capped
    /// exponential backoff. Never returns `Err`: persistent failures become
    /// an in-band marker string so the sandbox session is never unwound by
    /// a helper failure.
    async fn answer_one(
        &self,
        model: &dyn ChatModel,
        prompt: &str,
        overrides: Option<&BackendOptions>,
    ) -> String {
        if self.is_cancelled() {
            return "[llm_query cancelled: completion deadline exceeded]".to_string();
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let messages = [(Role::User, prompt)];
            match model.chat(&messages, overrides).await {
                Ok(reply) => {
                    // The call just issued runs at this service's depth + 1:
                    // `self.depth` is the depth of the sandbox that *issued*
                    // the call, not the call itself.
                    self.usage.record(
                        self.depth + 1,
                        reply.prompt_tokens,
                        reply.completion_tokens,
                    );
                    return reply.text;
                }
                Err(RlmError::ModelUnavailable { message, .. }) if attempt < MAX_PER_ITEM_ATTEMPTS => {
                    let backoff_ms = 50u64 * 2u64.pow(attempt.min(6));
                    tracing::debug!(attempt, backoff_ms, %message, "retrying transient helper call");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    continue;
                }
                Err(err) => {
                    return format!("[llm_query error: {err}]");
                }
            }
        }
    }

    async fn dispatch(
        &self,
        kind: HelperKind,
        prompts: Vec<String>,
    ) -> Vec<String> {
        if !self.config.recursion_allowed_at(self.depth) {
            return prompts.iter().map(|_| depth_capped_marker()).collect();
        }

        let backend_id = self.config.backend_for_depth(self.depth + 1);
        let overrides = self.config.backend_options.get(backend_id);
        let model = create_chat_model(backend_id);

        match kind {
            HelperKind::Single => {
                let prompt = prompts.first().cloned().unwrap_or_default();
                vec![self.answer_one(&*model, &prompt, overrides).await]
            }
            HelperKind::Batched => {
                let max_concurrency = self.config.max_batched_concurrency.max(1);
                let indexed: Vec<(usize, String)> = prompts.into_iter().enumerate().collect();
                let model = &*model;
                let results: Vec<(usize, String)> = stream::iter(indexed)
                    .map(|(idx, prompt)| async move {
                        (idx, self.answer_one(model, &prompt, overrides).await)
                    })
                    .buffer_unordered(max_concurrency)
                    .collect()
                    .await;

                let mut ordered = results;
                ordered.sort_by_key(|(idx, _)| *idx);
                ordered.into_iter().map(|(_, text)| text).collect()
            }
        }
    }
}

#[async_trait]
impl HelperDispatch for HelperService {
    async fn dispatch_raw(&self, request_json: &[u8]) -> Result<Vec<u8>, RlmError> {
        let request: HelperRequestBody =
            serde_json::from_slice(request_json).map_err(|e| RlmError::HelperDispatch {
                message: format!("malformed helper request: {e}"),
            })?;

        let texts = self.dispatch(request.kind, request.prompts).await;
        let response = HelperResponseBody { texts };
        serde_json::to_vec(&response).map_err(|e| RlmError::HelperDispatch {
            message: format!("failed to serialize helper response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rlm::model::test_support::MockChatModel;
    use crate::rlm::model::ChatReply;

    fn config_with_depth(deeper: &[&str]) -> Arc<Configuration> {
        Arc::new(
            Configuration::builder("root-model")
                .deeper_models(deeper.iter().copied())
                .build(),
        )
    }

    #[tokio::test]
    async fn depth_beyond_configured_models_returns_capped_marker() {
        let service = HelperService::new(config_with_depth(&[]), Arc::new(UsageAggregator::new()), 0);
        let request = HelperRequestBody {
            kind: HelperKind::Single,
            prompts: vec!["hello".to_string()],
            overrides: None,
        };
        let body = serde_json::to_vec(&request).unwrap();
        let response_bytes = service.dispatch_raw(&body).await.unwrap();
        let response: HelperResponseBody = serde_json::from_slice(&response_bytes).unwrap();
        assert_eq!(response.texts.len(), 1);
        assert!(response.texts[0].contains("depth is capped"));
    }

    #[tokio::test]
    async fn batched_dispatch_preserves_order_and_length() {
        let service =
            HelperService::new(config_with_depth(&["sub-model"]), Arc::new(UsageAggregator::new()), 0);
        let prompts: Vec<String> = (0..10).map(|i| format!("prompt-{i}")).collect();
        let request = HelperRequestBody {
            kind: HelperKind::Batched,
            prompts: prompts.clone(),
            overrides: None,
        };
        let body = serde_json::to_vec(&request).unwrap();
        let response_bytes = service.dispatch_raw(&body).await.unwrap();
        let response: HelperResponseBody = serde_json::from_slice(&response_bytes).unwrap();
        // Stub adapters always fail, so every entry is an in-band error
        // marker, but there must be exactly one per input prompt, in order.
        assert_eq!(response.texts.len(), prompts.len());
    }

    #[tokio::test]
    async fn cancelled_service_returns_marker_without_dispatching() {
        let service =
            HelperService::new(config_with_depth(&["sub-model"]), Arc::new(UsageAggregator::new()), 0);
        service.cancel();
        let request = HelperRequestBody {
            kind: HelperKind::Single,
            prompts: vec!["hello".to_string()],
            overrides: None,
        };
        let body = serde_json::to_vec(&request).unwrap();
        let response_bytes = service.dispatch_raw(&body).await.unwrap();
        let response: HelperResponseBody = serde_json::from_slice(&response_bytes).unwrap();
        assert!(response.texts[0].contains("cancelled"));
    }

    #[test]
    fn malformed_request_surfaces_helper_dispatch_error() {
        let service = HelperService::new(config_with_depth(&[]), Arc::new(UsageAggregator::new()), 0);
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(service.dispatch_raw(b"not json"))
            .unwrap_err();
        assert!(matches!(err, RlmError::HelperDispatch { .. }));
    }

    #[tokio::test]
    async fn answer_one_records_usage_at_depth_plus_one() {
        let usage = Arc::new(UsageAggregator::new());
        let service = HelperService::new(config_with_depth(&["sub-model"]), Arc::clone(&usage), 0);
        let model = MockChatModel::new(
            "sub-model",
            vec![ChatReply {
                text: "answer".to_string(),
                prompt_tokens: 10,
                completion_tokens: 5,
            }],
        );

        let text = service.answer_one(&model, "hello", None).await;

        assert_eq!(text, "answer");
        let snapshot = usage.snapshot();
        assert_eq!(snapshot.by_depth[0], crate::rlm::usage::DepthUsage::default());
        assert_eq!(snapshot.by_depth[1].prompt_tokens, 10);
        assert_eq!(snapshot.by_depth[1].completion_tokens, 5);
    }

    #[tokio::test]
    async fn dispatch_forwards_configured_backend_overrides() {
        let mut options = crate::rlm::config::BackendOptions::default();
        options.temperature = Some(0.2);
        let config = Arc::new(
            Configuration::builder("root-model")
                .deeper_models(["sub-model"])
                .backend_option("sub-model", options)
                .build(),
        );
        let service = HelperService::new(config, Arc::new(UsageAggregator::new()), 0);
        let model = MockChatModel::new(
            "sub-model",
            vec![ChatReply {
                text: "answer".to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
            }],
        );

        let overrides = service.config.backend_options.get("sub-model");
        let _ = service.answer_one(&model, "hello", overrides).await;

        let forwarded = model.last_overrides().expect("overrides forwarded");
        assert_eq!(forwarded.temperature, Some(0.2));
    }
}
