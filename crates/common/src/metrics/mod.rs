//! Metrics and observability utilities
//!
//! Describes the curation metrics and provides recording helpers with
//! standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all curation metrics
pub const METRICS_PREFIX: &str = "curation";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_annotation_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Annotation operations by kind and outcome"
    );

    describe_counter!(
        format!("{}_citations_imported_total", METRICS_PREFIX),
        Unit::Count,
        "Bibliographic records imported from the literature service"
    );

    describe_counter!(
        format!("{}_citation_mutations_total", METRICS_PREFIX),
        Unit::Count,
        "Primary/supplementary citation links written by reconciliation"
    );

    describe_counter!(
        format!("{}_literature_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Literature service batch lookups"
    );

    describe_histogram!(
        format!("{}_literature_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Literature service lookup latency in seconds"
    );
}

/// Helper to record the outcome of a manager operation
pub fn record_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_annotation_operations_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record imported citations
pub fn record_citation_imports(count: usize) {
    counter!(format!("{}_citations_imported_total", METRICS_PREFIX)).increment(count as u64);
}

/// Helper to record reconciliation writes
pub fn record_citation_mutation(kind: &str) {
    counter!(
        format!("{}_citation_mutations_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Helper to record literature lookups
pub fn record_literature_lookup(
    duration_secs: f64,
    provider: &str,
    batch_size: usize,
    success: bool,
) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_literature_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_literature_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);

    tracing::debug!(provider, batch_size, success, duration_secs, "Literature lookup recorded");
}
