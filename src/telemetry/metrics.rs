//! Metric instrument factories for presage.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"presage"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for presage instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("presage")
}

/// Counter: admission outcomes per pattern candidate.
/// Labels: `verdict` ("queued" | "below_threshold" | "duplicate_queued" |
/// "duplicate_cached" | "error").
pub fn admission_verdicts() -> Counter<u64> {
    meter()
        .u64_counter("presage.admission.verdicts")
        .with_description("Admission outcomes per pattern candidate")
        .build()
}

/// Counter: prediction job status transitions.
/// Labels: `from`, `to`.
pub fn queue_transitions() -> Counter<u64> {
    meter()
        .u64_counter("presage.queue.transitions")
        .with_description("Number of job status transitions")
        .build()
}

/// Counter: page cache operations.
/// Labels: `operation` ("upsert" | "lookup"), `hit` (lookups only).
pub fn cache_operations() -> Counter<u64> {
    meter()
        .u64_counter("presage.cache.operations")
        .with_description("Number of page cache operations")
        .build()
}

/// Counter: worker passes started.
/// Labels: `worker` ("predictor" | "generator" | "ambient").
pub fn worker_runs() -> Counter<u64> {
    meter()
        .u64_counter("presage.worker.runs")
        .with_description("Number of worker passes started")
        .build()
}

/// Histogram: duration of a full worker pass in milliseconds.
/// Labels: `worker`.
pub fn run_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("presage.worker.run_duration_ms")
        .with_description("Worker pass duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: ambient events stored.
/// Labels: `event_type`.
pub fn events_stored() -> Counter<u64> {
    meter()
        .u64_counter("presage.events.stored")
        .with_description("Number of ambient events stored")
        .build()
}
