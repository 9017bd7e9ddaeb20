//! Application-maintained index of tasks by state.
//!
//! The backend has no native secondary indexes worth using here, so task
//! rows are mirrored into a table partitioned by state. The index is
//! written alongside task transitions and is advisory: readers use it to
//! find candidate task ids, then load the authoritative row from the
//! task-info table.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trove_core::error::{Error, Result};
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Row, RowWrite, ScanOrder, ScanRange,
};

use crate::schema::tasks_by_state as schema;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted, not yet submitted to a topology.
    Pending,
    /// Submitted to the processing topic.
    Sent,
    /// Queued inside the topology.
    Queued,
    /// Being handled by the ingestion application itself.
    ProcessingByRestApplication,
    /// Records are flowing through the topology.
    CurrentlyProcessing,
    /// All records processed, post-processing not started.
    ReadyForPostProcessing,
    /// Post-processing in progress.
    InPostProcessing,
    /// Finished successfully.
    Processed,
    /// Cancelled or failed permanently.
    Dropped,
    /// Records are being depublished.
    Depublishing,
}

impl TaskState {
    /// The durable string representation used as the partition key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Queued => "QUEUED",
            Self::ProcessingByRestApplication => "PROCESSING_BY_REST_APPLICATION",
            Self::CurrentlyProcessing => "CURRENTLY_PROCESSING",
            Self::ReadyForPostProcessing => "READY_FOR_POST_PROCESSING",
            Self::InPostProcessing => "IN_POST_PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Dropped => "DROPPED",
            Self::Depublishing => "DEPUBLISHING",
        }
    }

    /// Parses the durable string representation.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unknown state string.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "QUEUED" => Ok(Self::Queued),
            "PROCESSING_BY_REST_APPLICATION" => Ok(Self::ProcessingByRestApplication),
            "CURRENTLY_PROCESSING" => Ok(Self::CurrentlyProcessing),
            "READY_FOR_POST_PROCESSING" => Ok(Self::ReadyForPostProcessing),
            "IN_POST_PROCESSING" => Ok(Self::InPostProcessing),
            "PROCESSED" => Ok(Self::Processed),
            "DROPPED" => Ok(Self::Dropped),
            "DEPUBLISHING" => Ok(Self::Depublishing),
            other => Err(Error::InvalidInput(format!("unknown task state: {other}"))),
        }
    }
}

/// One entry of the by-state index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskByState {
    /// Indexed state.
    pub state: TaskState,
    /// Topology the task runs on.
    pub topology_name: String,
    /// Task identifier.
    pub task_id: i64,
    /// Application instance that owns the task.
    pub application_id: Option<String>,
    /// Topic the task was submitted to.
    pub topic_name: Option<String>,
    /// When the task started.
    pub start_time: Option<DateTime<Utc>>,
}

/// The by-state task index.
#[derive(Debug)]
pub struct TaskStateIndex<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskStateIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PartitionStore> TaskStateIndex<S> {
    /// Creates the index over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn partition(state: TaskState) -> Partition {
        Partition::new(
            schema::TABLE,
            vec![KeyValue::Text(state.as_str().to_string())],
        )
    }

    fn clustering(topology_name: &str, task_id: i64) -> Vec<KeyValue> {
        vec![
            KeyValue::Text(topology_name.to_string()),
            KeyValue::BigInt(task_id),
        ]
    }

    /// Inserts one index entry.
    ///
    /// Moving a task between states is an insert into the new state's
    /// partition plus a [`delete`](Self::delete) from the old one; the
    /// caller owns that ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn insert(&self, entry: &TaskByState) -> Result<()> {
        let mut write = RowWrite::upsert(Self::clustering(&entry.topology_name, entry.task_id));
        if let Some(app) = &entry.application_id {
            write = write.set(schema::APPLICATION_ID, ColumnValue::Text(app.clone()));
        }
        if let Some(topic) = &entry.topic_name {
            write = write.set(schema::TOPIC_NAME, ColumnValue::Text(topic.clone()));
        }
        if let Some(start) = entry.start_time {
            write = write.set(schema::START_TIME, ColumnValue::Timestamp(start));
        }
        self.store
            .write(&Self::partition(entry.state), write)
            .await?;
        Ok(())
    }

    /// Removes one index entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn delete(
        &self,
        state: TaskState,
        topology_name: &str,
        task_id: i64,
    ) -> Result<()> {
        self.store
            .delete_row(
                &Self::partition(state),
                &Self::clustering(topology_name, task_id),
            )
            .await
    }

    /// Looks up one task's entry under one state.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn find_task(
        &self,
        state: TaskState,
        topology_name: &str,
        task_id: i64,
    ) -> Result<Option<TaskByState>> {
        let row = self
            .store
            .read(
                &Self::partition(state),
                &Self::clustering(topology_name, task_id),
            )
            .await?;
        Ok(row.and_then(|row| Self::from_row(state, &row)))
    }

    /// All entries in any of the given states.
    ///
    /// Each state is one partition read; results come back grouped by
    /// state in the order the states were given.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn find_all_by_states(&self, states: &[TaskState]) -> Result<Vec<TaskByState>> {
        let mut out = Vec::new();
        for &state in states {
            let rows = self
                .store
                .scan(
                    &Self::partition(state),
                    ScanRange::all(),
                    ScanOrder::Asc,
                    None,
                )
                .await?;
            out.extend(rows.iter().filter_map(|row| Self::from_row(state, row)));
        }
        Ok(out)
    }

    /// All entries in any of the given states for one topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn find_all_by_states_and_topology(
        &self,
        states: &[TaskState],
        topology_name: &str,
    ) -> Result<Vec<TaskByState>> {
        let mut out = Vec::new();
        for &state in states {
            let rows = self.topology_rows(state, topology_name, None).await?;
            out.extend(rows.iter().filter_map(|row| Self::from_row(state, row)));
        }
        Ok(out)
    }

    /// The first entry in any of the given states for one topology.
    ///
    /// States are tried in the order given; within a state, the entry with
    /// the lowest task id wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn find_one_by_states_and_topology(
        &self,
        states: &[TaskState],
        topology_name: &str,
    ) -> Result<Option<TaskByState>> {
        for &state in states {
            let rows = self.topology_rows(state, topology_name, Some(1)).await?;
            if let Some(entry) = rows.first().and_then(|row| Self::from_row(state, row)) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn topology_rows(
        &self,
        state: TaskState,
        topology_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        self.store
            .scan(
                &Self::partition(state),
                ScanRange::between(
                    vec![
                        KeyValue::Text(topology_name.to_string()),
                        KeyValue::BigInt(i64::MIN),
                    ],
                    vec![
                        KeyValue::Text(topology_name.to_string()),
                        KeyValue::BigInt(i64::MAX),
                    ],
                ),
                ScanOrder::Asc,
                limit,
            )
            .await
    }

    fn from_row(state: TaskState, row: &Row) -> Option<TaskByState> {
        let topology_name = match row.clustering.first() {
            Some(KeyValue::Text(t)) => t.clone(),
            _ => return None,
        };
        let task_id = match row.clustering.get(1) {
            Some(KeyValue::BigInt(id)) => *id,
            _ => return None,
        };
        Some(TaskByState {
            state,
            topology_name,
            task_id,
            application_id: row.text(schema::APPLICATION_ID).map(str::to_string),
            topic_name: row.text(schema::TOPIC_NAME).map(str::to_string),
            start_time: row.timestamp(schema::START_TIME),
        })
    }
}
