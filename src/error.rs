// src/error.rs
// Typed failure taxonomy for the curation pipeline.

use thiserror::Error;

/// Rejections produced by the selection normalizer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// A candidate array was located but it is empty. An empty selection is
    /// indistinguishable from total provider failure, never "zero good news".
    #[error("selection array is empty")]
    EmptySelection,

    /// No plausible selection array under any candidate key, and the
    /// fallback scan found nothing that looks like a selection list.
    #[error("no selection array found in provider payload")]
    NoSelectionArray,

    /// The provider payload did not parse as a JSON object at all.
    #[error("provider payload is not a JSON object: {0}")]
    MalformedInput(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Feed unreachable or non-200. Recorded per date; that date's
    /// contribution is skipped.
    #[error("feed fetch failed for {date}: {reason}")]
    Fetch { date: String, reason: String },

    /// Feed markup unparsable for one date.
    #[error("feed parse failed for {date}: {reason}")]
    Parse { date: String, reason: String },

    /// Completion request transport/auth failure. Aborts the run.
    #[error("completion provider failed: {0}")]
    Provider(String),

    /// Provider payload rejected by the normalizer. Aborts the run before
    /// any persistence.
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
}
