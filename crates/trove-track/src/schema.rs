//! Durable table and column names, and bucketing constants.
//!
//! These names and constants are shared with existing data and must be
//! preserved bit-for-bit; renaming a column or changing a bucket count is a
//! data migration, not a refactor.

/// Per-task, per-record processing status.
///
/// Row key: `(task_id, bucket_number, record_id)`;
/// `bucket_number = hash(record_id) mod 128`. Partition key is
/// `(task_id, bucket_number)`, clustering key is `record_id`.
pub mod processed_records {
    /// Table name.
    pub const TABLE: &str = "processed_records";
    /// Hash bucket count. Durable schema; changing it loses rows.
    pub const BUCKET_COUNT: u32 = 128;

    /// Attempt number column.
    pub const ATTEMPT_NUMBER: &str = "attempt_number";
    /// Destination identifier column.
    pub const DST_IDENTIFIER: &str = "dst_identifier";
    /// Topology name column.
    pub const TOPOLOGY_NAME: &str = "topology_name";
    /// Record state column.
    pub const STATE: &str = "state";
    /// Processing start time column.
    pub const START_TIME: &str = "start_time";
    /// Free-text diagnostics column.
    pub const INFO_TEXT: &str = "info_text";
    /// Additional info column.
    pub const ADDITIONAL_INFORMATIONS: &str = "additional_informations";
}

/// Per-dataset, per-record harvesting/indexing metadata.
///
/// Row key: `(metis_dataset_id, bucket_number, local_id)`;
/// `bucket_number = hash(local_id) mod 64`. Partition key is
/// `(metis_dataset_id, bucket_number)`, clustering key is `local_id`.
pub mod harvested_records {
    /// Table name.
    pub const TABLE: &str = "harvested_records";
    /// Hash bucket count. Durable schema; changing it loses rows.
    pub const BUCKET_COUNT: u32 = 64;

    /// Latest harvest date column.
    pub const LATEST_HARVEST_DATE: &str = "latest_harvest_date";
    /// Latest harvest checksum column.
    pub const LATEST_HARVEST_MD5: &str = "latest_harvest_md5";
    /// Preview harvest date column.
    pub const PREVIEW_HARVEST_DATE: &str = "preview_harvest_date";
    /// Preview harvest checksum column.
    pub const PREVIEW_HARVEST_MD5: &str = "preview_harvest_md5";
    /// Published harvest date column.
    pub const PUBLISHED_HARVEST_DATE: &str = "published_harvest_date";
    /// Published harvest checksum column.
    pub const PUBLISHED_HARVEST_MD5: &str = "published_harvest_md5";
}

/// Per-task, per-record outcome notifications.
///
/// Row key: `(task_id, bucket_number, resource_num)`;
/// `bucket_number = floor(resource_num / 10000)`. Partition key is
/// `(task_id, bucket_number)`, clustering key is `resource_num`.
pub mod notifications {
    /// Table name.
    pub const TABLE: &str = "notifications";
    /// Sequence bucket width.
    pub const BUCKET_SIZE: i64 = 10_000;

    /// Topology name column.
    pub const TOPOLOGY_NAME: &str = "topology_name";
    /// Resource identifier column.
    pub const RESOURCE: &str = "resource";
    /// Record state column.
    pub const STATE: &str = "state";
    /// Info text column.
    pub const INFO_TEXT: &str = "info_text";
    /// Additional information map column.
    pub const ADDITIONAL_INFORMATIONS: &str = "additional_informations";
    /// Result resource column.
    pub const RESULT_RESOURCE: &str = "result_resource";

    /// Well-known additional-information key: human-readable state detail.
    pub const STATE_DESCRIPTION_KEY: &str = "stateDescription";
    /// Well-known additional-information key: processing duration.
    pub const PROCESSING_TIME_KEY: &str = "processingTime";
    /// Well-known additional-information key: public record identifier.
    pub const EUROPEANA_ID_KEY: &str = "europeanaId";
}

/// Per-task error counters.
///
/// Row key: `(task_id, error_type)`. Partition key is `task_id`,
/// clustering key is the error-type UUID. `counter` is a counter column.
pub mod error_counters {
    /// Table name.
    pub const TABLE: &str = "error_counters";
    /// Occurrence counter column.
    pub const COUNTER: &str = "counter";
}

/// Per-type samples of concrete error occurrences.
///
/// Row key: `(task_id, error_type, resource)`. Partition key is
/// `(task_id, error_type)`, clustering key is `resource`: one sample per
/// resource per type, written with a plain upsert so concurrent reporters
/// never race. Callers bound the sampling; the store does not.
pub mod error_notifications {
    /// Table name.
    pub const TABLE: &str = "error_notifications";

    /// Error message column.
    pub const ERROR_MESSAGE: &str = "error_message";
    /// Additional info column.
    pub const ADDITIONAL_INFORMATIONS: &str = "additional_informations";
}

/// Application-maintained secondary index of tasks by state.
///
/// Row key: `(state, topology_name, task_id)`. Partition key is `state`,
/// clustering key is `(topology_name, task_id)`. Never the source of truth
/// for task attributes.
pub mod tasks_by_state {
    /// Table name.
    pub const TABLE: &str = "tasks_by_state";

    /// Application id column.
    pub const APPLICATION_ID: &str = "application_id";
    /// Topic name column.
    pub const TOPIC_NAME: &str = "topic_name";
    /// Start time column.
    pub const START_TIME: &str = "start_time";
}

/// Primary task table: one row per task.
///
/// Partition key is `task_id`; the partition holds a single row.
pub mod task_info {
    /// Table name.
    pub const TABLE: &str = "task_info";

    /// Topology name column.
    pub const TOPOLOGY_NAME: &str = "topology_name";
    /// Task state column.
    pub const STATE: &str = "state";
    /// State description column.
    pub const STATE_DESCRIPTION: &str = "state_description";
    /// Submission time column.
    pub const SENT_TIME: &str = "sent_time";
    /// Processing start time column.
    pub const START_TIME: &str = "start_time";
    /// Finish time column.
    pub const FINISH_TIME: &str = "finish_time";
    /// Expected record count column.
    pub const EXPECTED_RECORDS_NUMBER: &str = "expected_records_number";
    /// Processed record count column.
    pub const PROCESSED_RECORDS_COUNT: &str = "processed_records_count";
    /// Ignored record count column.
    pub const IGNORED_RECORDS_COUNT: &str = "ignored_records_count";
    /// Deleted record count column.
    pub const DELETED_RECORDS_COUNT: &str = "deleted_records_count";
    /// Processed error count column.
    pub const PROCESSED_ERRORS_COUNT: &str = "processed_errors_count";
    /// Deleted error count column.
    pub const DELETED_ERRORS_COUNT: &str = "deleted_errors_count";
    /// Expected post-processed record count column.
    pub const EXPECTED_POST_PROCESSED_RECORDS_NUMBER: &str =
        "expected_post_processed_records_number";
    /// Post-processed record count column.
    pub const POST_PROCESSED_RECORDS_COUNT: &str = "post_processed_records_count";
    /// Opaque task definition column.
    pub const DEFINITION: &str = "definition";
}
