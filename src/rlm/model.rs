//! Model Adapter: a uniform `chat(messages, overrides) -> (text, usage)`
//! contract over heterogeneous vendor clients.
//!
//! Grounded on `llms/base_llm.rs`'s `BaseLLM` trait and
//! `llms/providers/anthropic/mod.rs`'s stubbed transport body: vendor HTTP
//! wiring is out of scope for this crate, so concrete adapters keep the rich
//! config surface but leave `chat`/`achat` stubbed pending a shared client.

use async_trait::async_trait;

use crate::rlm::config::BackendOptions;
use crate::rlm::error::RlmError;
use crate::rlm::transcript::{Role, Turn};

/// One model reply plus the token counts it consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Uniform contract every backend (root or "deeper") must implement.
///
/// Implementations raise [`RlmError::ModelTransportPermanent`] for
/// authentication/request-shape problems (not retried) and
/// [`RlmError::ModelUnavailable`] once their own bounded retry budget for
/// transient back-pressure is exhausted; [`crate::rlm::orchestrator`] treats
/// both as fatal.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The backend identifier this adapter was constructed for (e.g. `"gpt-4o-mini"`).
    fn backend_id(&self) -> &str;

    /// Send the full transcript and return the assistant's reply.
    async fn chat(
        &self,
        messages: &[(Role, &str)],
        overrides: Option<&BackendOptions>,
    ) -> Result<ChatReply, RlmError>;
}

/// Resolve a `provider/model` (or bare `model`) identifier to a concrete
/// adapter, mirroring `agent/core.rs`'s `create_llm_instance` prefix-based
/// provider inference.
pub fn create_chat_model(identifier: &str) -> Box<dyn ChatModel> {
    let (provider, model) = split_provider(identifier);
    match provider {
        Some("anthropic") | None if model.starts_with("claude") => {
            Box::new(AnthropicAdapter::new(identifier))
        }
        Some("anthropic") => Box::new(AnthropicAdapter::new(identifier)),
        Some("openai") => Box::new(OpenAiAdapter::new(identifier)),
        _ => Box::new(OpenAiAdapter::new(identifier)),
    }
}

fn split_provider(identifier: &str) -> (Option<&str>, &str) {
    match identifier.split_once('/') {
        Some((provider, model)) => (Some(provider), model),
        None => (None, identifier),
    }
}

/// OpenAI-shaped chat-completions adapter.
///
/// Transport is intentionally unimplemented: vendor clients are an external
/// collaborator referenced only by interface.
pub struct OpenAiAdapter {
    backend_id: String,
}

impl OpenAiAdapter {
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiAdapter {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    async fn chat(
        &self,
        _messages: &[(Role, &str)],
        _overrides: Option<&BackendOptions>,
    ) -> Result<ChatReply, RlmError> {
        Err(RlmError::ModelTransportPermanent {
            backend: self.backend_id.clone(),
            message: "OpenAI transport not wired in this build: stub adapter".to_string(),
        })
    }
}

/// Anthropic-shaped messages-API adapter. See [`OpenAiAdapter`] for the
/// stubbing rationale.
pub struct AnthropicAdapter {
    backend_id: String,
}

impl AnthropicAdapter {
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicAdapter {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    async fn chat(
        &self,
        _messages: &[(Role, &str)],
        _overrides: Option<&BackendOptions>,
    ) -> Result<ChatReply, RlmError> {
        Err(RlmError::ModelTransportPermanent {
            backend: self.backend_id.clone(),
            message: "Anthropic transport not wired in this build: stub adapter".to_string(),
        })
    }
}

/// Scripted [`ChatModel`] for exercising the orchestrator/helper service
/// without a live vendor transport, in the shape of the pack's own
/// queueable `MockLLMBackend`: replies are consumed in order, and the
/// overrides passed to the most recent `chat` call are captured for
/// assertions.
#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::rlm::config::BackendOptions;
    use crate::rlm::error::RlmError;
    use crate::rlm::transcript::Role;

    use super::{ChatModel, ChatReply};

    pub(crate) struct MockChatModel {
        backend_id: String,
        replies: Mutex<VecDeque<ChatReply>>,
        last_overrides: Mutex<Option<BackendOptions>>,
    }

    impl MockChatModel {
        pub(crate) fn new(backend_id: impl Into<String>, replies: Vec<ChatReply>) -> Self {
            Self {
                backend_id: backend_id.into(),
                replies: Mutex::new(replies.into_iter().collect()),
                last_overrides: Mutex::new(None),
            }
        }

        pub(crate) fn last_overrides(&self) -> Option<BackendOptions> {
            self.last_overrides.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for MockChatModel {
        fn backend_id(&self) -> &str {
            &self.backend_id
        }

        async fn chat(
            &self,
            _messages: &[(Role, &str)],
            overrides: Option<&BackendOptions>,
        ) -> Result<ChatReply, RlmError> {
            *self.last_overrides.lock().unwrap() = overrides.cloned();
            self.replies.lock().unwrap().pop_front().ok_or_else(|| {
                RlmError::ModelTransportPermanent {
                    backend: self.backend_id.clone(),
                    message: "mock model exhausted its scripted replies".to_string(),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_provider_handles_prefixed_and_bare_identifiers() {
        assert_eq!(split_provider("openai/gpt-4o"), (Some("openai"), "gpt-4o"));
        assert_eq!(split_provider("gpt-4o-mini"), (None, "gpt-4o-mini"));
    }

    #[test]
    fn create_chat_model_infers_anthropic_from_claude_prefix() {
        let model = create_chat_model("claude-3-5-sonnet");
        assert_eq!(model.backend_id(), "claude-3-5-sonnet");
    }

    #[test]
    fn create_chat_model_respects_explicit_provider_prefix() {
        let model = create_chat_model("anthropic/claude-3-opus");
        assert_eq!(model.backend_id(), "anthropic/claude-3-opus");
    }

    #[tokio::test]
    async fn stub_adapters_surface_permanent_error_not_panic() {
        let model = create_chat_model("gpt-4o-mini");
        let err = model.chat(&[(Role::User, "hi")], None).await.unwrap_err();
        assert!(matches!(err, RlmError::ModelTransportPermanent { .. }));
    }
}
