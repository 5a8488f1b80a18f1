//! Prometheus metrics for the Stevedore server.
//!
//! Exposes counters for session lifecycle events, chunk reception, and
//! janitor sweeps, plus latency histograms for the two expensive operations
//! (chunk writes and finalization). Scraped at `GET /metrics` when enabled.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static SESSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_sessions_created_total",
        "Total number of upload sessions created",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_RESUMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_sessions_resumed_total",
        "Total number of init calls that resumed an existing session",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_sessions_completed_total",
        "Total number of upload sessions finalized successfully",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_sessions_failed_total",
        "Total number of upload sessions that failed during finalization",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_chunks_received_total",
        "Total number of chunks written and recorded",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_DUPLICATE: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_chunks_duplicate_total",
        "Total number of chunk uploads skipped as already received",
    )
    .expect("metric creation failed")
});

pub static BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_bytes_received_total",
        "Total payload bytes written to target files",
    )
    .expect("metric creation failed")
});

pub static CHUNK_WRITE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stevedore_chunk_write_duration_seconds",
            "Time spent spool-to-target per chunk",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

pub static FINALIZE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stevedore_finalize_duration_seconds",
            "Time spent digesting and sealing a completed upload",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

pub static JANITOR_SESSIONS_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_janitor_sessions_removed_total",
        "Total expired sessions reclaimed by the janitor",
    )
    .expect("metric creation failed")
});

pub static JANITOR_SCRATCH_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_janitor_scratch_removed_total",
        "Total stale scratch files reclaimed by the janitor",
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SESSIONS_CREATED.clone()),
            Box::new(SESSIONS_RESUMED.clone()),
            Box::new(SESSIONS_COMPLETED.clone()),
            Box::new(SESSIONS_FAILED.clone()),
            Box::new(CHUNKS_RECEIVED.clone()),
            Box::new(CHUNKS_DUPLICATE.clone()),
            Box::new(BYTES_RECEIVED.clone()),
            Box::new(CHUNK_WRITE_DURATION.clone()),
            Box::new(FINALIZE_DURATION.clone()),
            Box::new(JANITOR_SESSIONS_REMOVED.clone()),
            Box::new(JANITOR_SCRATCH_REMOVED.clone()),
        ];
        for metric in metrics {
            REGISTRY
                .register(metric)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    match String::from_utf8(buf) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics output was not UTF-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
