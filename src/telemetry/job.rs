//! Job processing span helpers.
//!
//! Provides span creation and status-change recording for prediction
//! jobs flowing through the consumer worker.

use tracing::Span;
use uuid::Uuid;

/// Start a span for processing one claimed job.
///
/// The `job.status` field is declared empty and can be updated via
/// [`record_status_change`].
pub fn start_job_span(worker: &str, job_id: &Uuid) -> Span {
    tracing::info_span!(
        "job.process",
        "job.worker" = worker,
        "job.id" = %job_id,
        "job.status" = tracing::field::Empty,
    )
}

/// Record a status change event on the given span.
///
/// Emits a tracing `info` event scoped to the span.
pub fn record_status_change(span: &Span, from: &str, to: &str) {
    span.record("job.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_change");
    });
}
