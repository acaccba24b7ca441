//! Ambient logging/tracing setup and per-completion transcript persistence.
//!
//! Grounded on `src/bin/server.rs`'s `tracing_subscriber::fmt()` /
//! `EnvFilter` initialization idiom; the transcript writer is this engine's
//! own, since `crewai` has no equivalent of a per-run conversation log.

use std::path::Path;

use crate::rlm::transcript::Transcript;

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` if set; otherwise defaults to `info` everywhere and
/// `debug` for this crate, matching `src/bin/server.rs`'s fallback filter.
/// Safe to call more than once: a second call is a no-op.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,rlm_engine=debug".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Write a completed transcript to `log_dir` as pretty-printed JSON, named
/// by `completion_id`. Errors are logged and swallowed: a failed transcript
/// write must never fail the completion it is recording.
pub fn persist_transcript(log_dir: &Path, completion_id: &str, transcript: &Transcript) {
    let path = log_dir.join(format!("{completion_id}.json"));
    match serde_json::to_vec_pretty(transcript) {
        Ok(bytes) => {
            if let Err(e) = std::fs::create_dir_all(log_dir) {
                tracing::warn!(error = %e, path = %log_dir.display(), "failed to create log directory");
                return;
            }
            if let Err(e) = std::fs::write(&path, bytes) {
                tracing::warn!(error = %e, path = %path.display(), "failed to write transcript");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize transcript for persistence");
        }
    }
}
