//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = presage::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "presage-test".to_string(),
        log_level: "info".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = presage::telemetry::init_telemetry(config);
}

#[test]
fn genai_chat_span_creates() {
    let _span =
        presage::telemetry::genai::start_chat_span("claude-sonnet-4-20250514", "anthropic");
}

#[test]
fn job_span_creates_and_records_status_change() {
    let id = Uuid::new_v4();
    let span = presage::telemetry::job::start_job_span("generator", &id);
    presage::telemetry::job::record_status_change(&span, "queued", "processing");
}
