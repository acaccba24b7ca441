//! Error taxonomy for the RLM engine.
//!
//! Corresponds to the failure kinds enumerated for the completion core.

use thiserror::Error;

/// The kind of budget that was exhausted when a completion fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    /// Maximum iteration count reached.
    Iterations,
    /// Aggregate token budget reached.
    Tokens,
    /// Wall-clock deadline reached.
    Deadline,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iterations => write!(f, "iterations"),
            Self::Tokens => write!(f, "tokens"),
            Self::Deadline => write!(f, "deadline"),
        }
    }
}

/// Every fatal error a completion can surface to its caller.
#[derive(Debug, Error)]
pub enum RlmError {
    /// `payload` was not JSON-serializable or exceeded the configured byte cap.
    #[error("payload serialization error: {message}")]
    Serialization { message: String },

    /// The sandbox bootstrap snippet failed, or the channel could not be established.
    #[error("sandbox startup error: {message}")]
    SandboxStartup { message: String },

    /// Vendor authentication rejected, malformed request, or unsupported model.
    #[error("model transport error ({backend}): {message}")]
    ModelTransportPermanent { backend: String, message: String },

    /// Transient backend failure survived the adapter's retry budget.
    #[error("model unavailable after retries ({backend}): {message}")]
    ModelUnavailable { backend: String, message: String },

    /// An orthogonal budget (iterations, tokens, deadline) was exhausted.
    #[error("budget exhausted: {kind} (transcript length {transcript_len})")]
    BudgetExhausted {
        kind: BudgetKind,
        transcript_len: usize,
    },

    /// The assistant kept replying without code or a final directive.
    #[error("protocol violation: assistant reply contained no code and no final directive")]
    ProtocolViolation,

    /// The sandbox channel was lost (crash, or unresponsive past its I/O deadline).
    #[error("sandbox channel unavailable: {message}")]
    SandboxUnavailable { message: String },

    /// Dispatch to the Helper Service failed in a way that cannot be reported
    /// as an in-band marker (e.g. the sandbox channel itself is gone).
    #[error("helper dispatch failed: {message}")]
    HelperDispatch { message: String },

    /// A configured sandbox variant has no transport wired up in this build.
    #[error("sandbox variant unavailable: {variant}")]
    SandboxVariantUnavailable { variant: String },
}

/// Convenience alias used throughout the engine.
pub type RlmResult<T> = Result<T, RlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_kind_displays_lowercase_name() {
        assert_eq!(BudgetKind::Iterations.to_string(), "iterations");
        assert_eq!(BudgetKind::Tokens.to_string(), "tokens");
        assert_eq!(BudgetKind::Deadline.to_string(), "deadline");
    }

    #[test]
    fn budget_exhausted_renders_kind_and_length() {
        let err = RlmError::BudgetExhausted {
            kind: BudgetKind::Iterations,
            transcript_len: 4,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("iterations"));
        assert!(rendered.contains('4'));
    }

    #[test]
    fn errors_do_not_panic_on_display() {
        let errs: Vec<RlmError> = vec![
            RlmError::Serialization {
                message: "cycle".into(),
            },
            RlmError::SandboxStartup {
                message: "boom".into(),
            },
            RlmError::ProtocolViolation,
            RlmError::SandboxVariantUnavailable {
                variant: "container".into(),
            },
        ];
        for err in errs {
            let _ = err.to_string();
        }
    }
}
