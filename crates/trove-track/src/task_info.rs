//! Authoritative per-task state and counters.
//!
//! One single-row partition per task. The by-state index points here;
//! everything a task reports about itself (lifecycle, timestamps, record
//! counters, opaque definition) lives on this row and is updated with
//! partial-column upserts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trove_core::error::{Error, Result};
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Row, RowWrite,
};

use crate::schema::task_info as schema;
use crate::task_state::TaskState;

/// Authoritative state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task identifier.
    pub task_id: i64,
    /// Topology the task runs on.
    pub topology_name: String,
    /// Lifecycle state.
    pub state: TaskState,
    /// Human-readable state detail.
    pub state_description: Option<String>,
    /// When the task was submitted.
    pub sent_time: Option<DateTime<Utc>>,
    /// When processing started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the task finished.
    pub finish_time: Option<DateTime<Utc>>,
    /// Expected number of records, -1 when unknown.
    pub expected_records_number: i32,
    /// Records processed so far.
    pub processed_records_count: i32,
    /// Records ignored.
    pub ignored_records_count: i32,
    /// Records deleted.
    pub deleted_records_count: i32,
    /// Errors among processed records.
    pub processed_errors_count: i32,
    /// Errors among deleted records.
    pub deleted_errors_count: i32,
    /// Expected number of post-processed records, -1 when unknown.
    pub expected_post_processed_records_number: i32,
    /// Records post-processed so far.
    pub post_processed_records_count: i32,
    /// Opaque serialized task definition.
    pub definition: Option<String>,
}

impl TaskInfo {
    /// A freshly accepted task with zeroed counters.
    #[must_use]
    pub fn new(task_id: i64, topology_name: impl Into<String>, state: TaskState) -> Self {
        Self {
            task_id,
            topology_name: topology_name.into(),
            state,
            state_description: None,
            sent_time: None,
            start_time: None,
            finish_time: None,
            expected_records_number: -1,
            processed_records_count: 0,
            ignored_records_count: 0,
            deleted_records_count: 0,
            processed_errors_count: 0,
            deleted_errors_count: 0,
            expected_post_processed_records_number: -1,
            post_processed_records_count: 0,
            definition: None,
        }
    }
}

/// Running totals reported by a processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounters {
    /// Records processed.
    pub processed: i32,
    /// Records ignored.
    pub ignored: i32,
    /// Records deleted.
    pub deleted: i32,
    /// Errors among processed records.
    pub processed_errors: i32,
    /// Errors among deleted records.
    pub deleted_errors: i32,
}

/// Store for [`TaskInfo`] rows.
#[derive(Debug)]
pub struct TaskInfoStore<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskInfoStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PartitionStore> TaskInfoStore<S> {
    /// Creates the store over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn partition(task_id: i64) -> Partition {
        Partition::new(schema::TABLE, vec![KeyValue::BigInt(task_id)])
    }

    /// Writes a full task row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn insert(&self, info: &TaskInfo) -> Result<()> {
        let mut write = RowWrite::upsert(Vec::new())
            .set(
                schema::TOPOLOGY_NAME,
                ColumnValue::Text(info.topology_name.clone()),
            )
            .set(schema::STATE, ColumnValue::Text(info.state.as_str().into()))
            .set(
                schema::EXPECTED_RECORDS_NUMBER,
                ColumnValue::Int(info.expected_records_number),
            )
            .set(
                schema::PROCESSED_RECORDS_COUNT,
                ColumnValue::Int(info.processed_records_count),
            )
            .set(
                schema::IGNORED_RECORDS_COUNT,
                ColumnValue::Int(info.ignored_records_count),
            )
            .set(
                schema::DELETED_RECORDS_COUNT,
                ColumnValue::Int(info.deleted_records_count),
            )
            .set(
                schema::PROCESSED_ERRORS_COUNT,
                ColumnValue::Int(info.processed_errors_count),
            )
            .set(
                schema::DELETED_ERRORS_COUNT,
                ColumnValue::Int(info.deleted_errors_count),
            )
            .set(
                schema::EXPECTED_POST_PROCESSED_RECORDS_NUMBER,
                ColumnValue::Int(info.expected_post_processed_records_number),
            )
            .set(
                schema::POST_PROCESSED_RECORDS_COUNT,
                ColumnValue::Int(info.post_processed_records_count),
            );
        if let Some(description) = &info.state_description {
            write = write.set(
                schema::STATE_DESCRIPTION,
                ColumnValue::Text(description.clone()),
            );
        }
        if let Some(sent) = info.sent_time {
            write = write.set(schema::SENT_TIME, ColumnValue::Timestamp(sent));
        }
        if let Some(start) = info.start_time {
            write = write.set(schema::START_TIME, ColumnValue::Timestamp(start));
        }
        if let Some(finish) = info.finish_time {
            write = write.set(schema::FINISH_TIME, ColumnValue::Timestamp(finish));
        }
        if let Some(definition) = &info.definition {
            write = write.set(schema::DEFINITION, ColumnValue::Text(definition.clone()));
        }
        self.store.write(&Self::partition(info.task_id), write).await?;
        Ok(())
    }

    /// Looks up one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails or the stored state
    /// string cannot be parsed.
    pub async fn find_by_id(&self, task_id: i64) -> Result<Option<TaskInfo>> {
        let row = self.store.read(&Self::partition(task_id), &[]).await?;
        row.map(|row| Self::from_row(task_id, &row)).transpose()
    }

    /// Looks up one task, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` for an unknown task id, or any
    /// underlying store error.
    pub async fn require(&self, task_id: i64) -> Result<TaskInfo> {
        self.find_by_id(task_id)
            .await?
            .ok_or_else(|| Error::resource_not_found("task", task_id.to_string()))
    }

    /// Updates a task's state and description.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_state(
        &self,
        task_id: i64,
        state: TaskState,
        description: &str,
    ) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id),
                RowWrite::upsert(Vec::new())
                    .set(schema::STATE, ColumnValue::Text(state.as_str().into()))
                    .set(
                        schema::STATE_DESCRIPTION,
                        ColumnValue::Text(description.to_string()),
                    ),
            )
            .await?;
        Ok(())
    }

    /// Updates a task's record counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_counters(&self, task_id: i64, counters: RecordCounters) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id),
                RowWrite::upsert(Vec::new())
                    .set(
                        schema::PROCESSED_RECORDS_COUNT,
                        ColumnValue::Int(counters.processed),
                    )
                    .set(
                        schema::IGNORED_RECORDS_COUNT,
                        ColumnValue::Int(counters.ignored),
                    )
                    .set(
                        schema::DELETED_RECORDS_COUNT,
                        ColumnValue::Int(counters.deleted),
                    )
                    .set(
                        schema::PROCESSED_ERRORS_COUNT,
                        ColumnValue::Int(counters.processed_errors),
                    )
                    .set(
                        schema::DELETED_ERRORS_COUNT,
                        ColumnValue::Int(counters.deleted_errors),
                    ),
            )
            .await?;
        Ok(())
    }

    /// Updates a task's post-processed record count.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_post_processed_count(&self, task_id: i64, count: i32) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id),
                RowWrite::upsert(Vec::new())
                    .set(schema::POST_PROCESSED_RECORDS_COUNT, ColumnValue::Int(count)),
            )
            .await?;
        Ok(())
    }

    /// Updates a task's expected record count.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_expected_size(&self, task_id: i64, expected: i32) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id),
                RowWrite::upsert(Vec::new())
                    .set(schema::EXPECTED_RECORDS_NUMBER, ColumnValue::Int(expected)),
            )
            .await?;
        Ok(())
    }

    /// Marks a task finished: terminal state, description, finish time.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn end_task(
        &self,
        task_id: i64,
        state: TaskState,
        description: &str,
        finish_time: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id),
                RowWrite::upsert(Vec::new())
                    .set(schema::STATE, ColumnValue::Text(state.as_str().into()))
                    .set(
                        schema::STATE_DESCRIPTION,
                        ColumnValue::Text(description.to_string()),
                    )
                    .set(schema::FINISH_TIME, ColumnValue::Timestamp(finish_time)),
            )
            .await?;
        Ok(())
    }

    fn from_row(task_id: i64, row: &Row) -> Result<TaskInfo> {
        let state = match row.text(schema::STATE) {
            Some(s) => TaskState::parse(s)?,
            None => TaskState::Pending,
        };
        Ok(TaskInfo {
            task_id,
            topology_name: row
                .text(schema::TOPOLOGY_NAME)
                .unwrap_or_default()
                .to_string(),
            state,
            state_description: row.text(schema::STATE_DESCRIPTION).map(str::to_string),
            sent_time: row.timestamp(schema::SENT_TIME),
            start_time: row.timestamp(schema::START_TIME),
            finish_time: row.timestamp(schema::FINISH_TIME),
            expected_records_number: row.int(schema::EXPECTED_RECORDS_NUMBER).unwrap_or(-1),
            processed_records_count: row.int(schema::PROCESSED_RECORDS_COUNT).unwrap_or(0),
            ignored_records_count: row.int(schema::IGNORED_RECORDS_COUNT).unwrap_or(0),
            deleted_records_count: row.int(schema::DELETED_RECORDS_COUNT).unwrap_or(0),
            processed_errors_count: row.int(schema::PROCESSED_ERRORS_COUNT).unwrap_or(0),
            deleted_errors_count: row.int(schema::DELETED_ERRORS_COUNT).unwrap_or(0),
            expected_post_processed_records_number: row
                .int(schema::EXPECTED_POST_PROCESSED_RECORDS_NUMBER)
                .unwrap_or(-1),
            post_processed_records_count: row
                .int(schema::POST_PROCESSED_RECORDS_COUNT)
                .unwrap_or(0),
            definition: row.text(schema::DEFINITION).map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::memory::MemoryStore;

    fn store() -> TaskInfoStore<MemoryStore> {
        TaskInfoStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = store();
        let mut info = TaskInfo::new(7, "oai_harvest", TaskState::Pending);
        info.definition = Some("{\"url\":\"http://example.org/oai\"}".into());
        store.insert(&info).await.expect("insert");

        let found = store
            .find_by_id(7)
            .await
            .expect("find")
            .expect("task");
        assert_eq!(found.topology_name, "oai_harvest");
        assert_eq!(found.state, TaskState::Pending);
        assert_eq!(found.expected_records_number, -1);
        assert!(found.definition.is_some());
    }

    #[tokio::test]
    async fn test_require_unknown_task() {
        let store = store();
        let err = store.require(404).await.expect_err("should fail");
        assert!(matches!(err, Error::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_partial_updates_preserve_row() {
        let store = store();
        let info = TaskInfo::new(7, "oai_harvest", TaskState::Queued);
        store.insert(&info).await.expect("insert");

        store
            .update_state(7, TaskState::CurrentlyProcessing, "processing records")
            .await
            .expect("update state");
        store
            .update_expected_size(7, 5000)
            .await
            .expect("update expected");
        store
            .update_counters(
                7,
                RecordCounters {
                    processed: 120,
                    ignored: 3,
                    ..RecordCounters::default()
                },
            )
            .await
            .expect("update counters");

        let found = store.require(7).await.expect("require");
        assert_eq!(found.state, TaskState::CurrentlyProcessing);
        assert_eq!(found.expected_records_number, 5000);
        assert_eq!(found.processed_records_count, 120);
        assert_eq!(found.ignored_records_count, 3);
        assert_eq!(found.topology_name, "oai_harvest");
    }

    #[tokio::test]
    async fn test_end_task_sets_terminal_fields() {
        let store = store();
        let info = TaskInfo::new(7, "oai_harvest", TaskState::CurrentlyProcessing);
        store.insert(&info).await.expect("insert");

        let finish = Utc::now();
        store
            .end_task(7, TaskState::Processed, "completed", finish)
            .await
            .expect("end");

        let found = store.require(7).await.expect("require");
        assert_eq!(found.state, TaskState::Processed);
        assert_eq!(found.state_description.as_deref(), Some("completed"));
        assert_eq!(found.finish_time, Some(finish));
    }
}
