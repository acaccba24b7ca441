//! Sandbox Session: start → execute (repeatable) → terminate lifecycle over
//! an abstract Python interpreter.
//!
//! The session is a tagged variant (see [`crate::rlm::config::SandboxVariant`]);
//! concrete variants differ only in where the interpreter runs. The line
//! protocol in [`protocol`] is identical across variants. Grounded on
//! `mcp/transports/mod.rs`'s `BaseTransport` trait shape
//! (`connect`/`disconnect`/`connected`), generalized here to the
//! execute/evaluate operations this engine needs.

pub mod protocol;
pub mod subprocess;

use async_trait::async_trait;

use crate::rlm::config::SandboxVariant;
use crate::rlm::error::RlmError;
use crate::rlm::helper::HelperDispatch;

pub use protocol::ExecutionResult;

/// Reserved identifier under which the deserialized payload is bound inside
/// every sandbox namespace. Assigned exactly once, by the bootstrap snippet,
/// before the first model iteration.
pub const PAYLOAD_BINDING: &str = "context";

/// A started, running Python interpreter obeying the framed line protocol.
#[async_trait]
pub trait SandboxSession: Send + Sync {
    /// Run the bootstrap snippet: deserialize the payload into
    /// `payload_binding`, install the `llm_query`/`llm_query_batched`/
    /// `FINAL_VAR` proxies, then run `setup_code` if present.
    ///
    /// A bootstrap failure is fatal; the caller must still call
    /// [`terminate`](Self::terminate) afterwards.
    async fn bootstrap(
        &mut self,
        payload_binding: &str,
        payload_json: &[u8],
        setup_code: Option<&str>,
    ) -> Result<(), RlmError>;

    /// Execute one code string as a module body. Helper calls issued by the
    /// code (`llm_query`/`llm_query_batched`) are dispatched through
    /// `helpers` and answered before this call returns.
    async fn execute(
        &mut self,
        code: &str,
        helpers: &dyn HelperDispatch,
    ) -> Result<ExecutionResult, RlmError>;

    /// Evaluate a bare identifier in the namespace (the `FINAL_VAR` lookup).
    /// This is a distinct operation from [`execute`](Self::execute): it never
    /// accepts or runs arbitrary code, only an identifier name.
    async fn evaluate_identifier(&mut self, identifier: &str) -> Result<ExecutionResult, RlmError>;

    /// Release all interpreter resources and close the channel. Idempotent;
    /// called on every completion exit path.
    async fn terminate(&mut self);
}

/// Construct the configured sandbox variant.
///
/// Only `local-subprocess` has a concrete transport in this build;
/// `container`/`remote-function` are recognized configuration values that
/// currently surface [`RlmError::SandboxVariantUnavailable`] rather than
/// silently falling back to a different transport (see the open-question
/// decision in `DESIGN.md`).
pub fn create_sandbox(variant: SandboxVariant) -> Result<Box<dyn SandboxSession>, RlmError> {
    match variant {
        SandboxVariant::LocalSubprocess => Ok(Box::new(subprocess::LocalSubprocessSandbox::new())),
        SandboxVariant::Container => Err(RlmError::SandboxVariantUnavailable {
            variant: "container".to_string(),
        }),
        SandboxVariant::RemoteFunction => Err(RlmError::SandboxVariantUnavailable {
            variant: "remote-function".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwired_variants_surface_a_named_error() {
        let err = create_sandbox(SandboxVariant::Container).unwrap_err();
        match err {
            RlmError::SandboxVariantUnavailable { variant } => assert_eq!(variant, "container"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn local_subprocess_variant_constructs() {
        assert!(create_sandbox(SandboxVariant::LocalSubprocess).is_ok());
    }
}
