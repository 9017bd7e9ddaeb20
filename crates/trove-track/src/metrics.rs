//! Metrics for the tracking stores.
//!
//! Counters and histograms recorded through the `metrics` facade. The
//! application decides which exporter to install; without one, recording
//! is a no-op.

/// Records cleaned (de-indexed) by bulk maintenance.
pub const RECORDS_CLEANED: &str = "trove_records_cleaned_total";

/// Records stamped by complete-if-empty bulk maintenance.
pub const RECORDS_COMPLETED: &str = "trove_records_completed_total";

/// Bucket batches flushed by the coalescer.
pub const COALESCER_FLUSHES: &str = "trove_coalescer_flushes_total";

/// Notification rows appended.
pub const NOTIFICATIONS_APPENDED: &str = "trove_notifications_appended_total";

/// Error occurrences reported to the aggregator.
pub const ERRORS_REPORTED: &str = "trove_errors_reported_total";

/// Registers metric descriptions with the installed recorder.
///
/// Call once at startup, after installing the exporter.
pub fn register_metrics() {
    metrics::describe_counter!(
        RECORDS_CLEANED,
        "Records de-indexed by bulk clean maintenance"
    );
    metrics::describe_counter!(
        RECORDS_COMPLETED,
        "Records stamped by complete-if-empty maintenance"
    );
    metrics::describe_counter!(
        COALESCER_FLUSHES,
        "Single-partition bucket batches flushed by the coalescer"
    );
    metrics::describe_counter!(NOTIFICATIONS_APPENDED, "Notification rows appended");
    metrics::describe_counter!(ERRORS_REPORTED, "Error occurrences reported");
    metrics::describe_counter!(
        trove_core::retry::RETRY_ATTEMPTS_METRIC,
        "Store operation retries after a transient failure"
    );
    metrics::describe_counter!(
        trove_core::retry::RETRIES_EXHAUSTED_METRIC,
        "Store operations that failed on every attempt"
    );
}

/// Records cleaned records from one maintenance pass.
pub fn record_records_cleaned(count: u64) {
    metrics::counter!(RECORDS_CLEANED).increment(count);
}

/// Records completed records from one maintenance pass.
pub fn record_records_completed(count: u64) {
    metrics::counter!(RECORDS_COMPLETED).increment(count);
}

/// Records one appended notification.
pub fn record_notification_appended() {
    metrics::counter!(NOTIFICATIONS_APPENDED).increment(1);
}

/// Records one reported error occurrence.
pub fn record_error_reported() {
    metrics::counter!(ERRORS_REPORTED).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_without_recorder() {
        // No recorder installed; all calls are no-ops and must not panic.
        register_metrics();
        record_records_cleaned(3);
        record_records_completed(5);
        record_notification_appended();
        record_error_reported();
    }
}
