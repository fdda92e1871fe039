// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod llm;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::error::{NormalizeError, PipelineError};
pub use crate::normalize::{normalize_raw, normalize_selection, SelectionRecord};
pub use crate::pipeline::{run, AppContext, RunFailure, RunReport};
