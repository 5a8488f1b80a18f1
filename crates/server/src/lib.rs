//! HTTP server and session coordinator for Stevedore resumable uploads.
//!
//! This crate provides:
//! - The session coordinator (init, chunk reception, exactly-once finalize)
//! - The janitor reclaiming abandoned sessions and scratch files
//! - The HTTP surface and its error mapping
//! - Prometheus metrics

pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod metrics;
pub mod routes;
pub mod state;

pub use coordinator::{ChunkOutcome, Coordinator, InitOutcome};
pub use error::{ApiError, ApiResult};
pub use janitor::{Janitor, JanitorStats};
pub use routes::create_router;
pub use state::AppState;
