//! Error types for the packet pipeline.

use thiserror::Error;

/// Errors surfaced by pipeline stages.
///
/// Terminal stream conditions (end of window, canceled event) are not errors;
/// they are the `Ok(false)` return of `handle_packet`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A filter was started or fed before a downstream sink was connected.
    #[error("No sink has been connected")]
    NoSink,

    /// Reading packets or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a JSON record failed.
    #[error("Failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}
