//! Progress reporting for long-running index runs.

/// Sender for emitting progress events to the caller (CLI, tests).
pub type ProgressTx = tokio::sync::mpsc::UnboundedSender<ProgressEvent>;

/// Events emitted while an index run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A pipeline phase started: "scan", "hash", "diff", "chunk", "embed", "upsert".
    Phase(&'static str),
    /// One file was skipped and will be retried on the next run.
    FileSkipped { path: String, reason: String },
    /// The diff against the previous summary was empty.
    NoChanges,
    /// Embedding progress within the current run.
    Embedded { done: usize, total: usize },
}
