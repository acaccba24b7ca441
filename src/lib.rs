//! # Recursive Language Model (RLM) engine
//!
//! Lets a model answer a task over a payload larger than its own context
//! window by driving a sandboxed Python REPL, recursing into isolated
//! sub-model calls for sub-tasks, and terminating via an explicit
//! final-variable directive. See [`rlm`] for the full component layout.

pub mod rlm;

pub use rlm::{acomplete, complete, Configuration, ConfigurationBuilder, RlmError, RlmResult};

/// Library version.
pub const VERSION: &str = "0.1.0";
