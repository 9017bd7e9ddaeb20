//! Per-task, per-record processing status.
//!
//! One row per `(task_id, record_id)`, routed to one of 128 hash buckets of
//! the record id so that no task's records ever collect in a single
//! partition. Every update is a partial-column upsert: independent pipeline
//! stages update different columns of the same logical record concurrently,
//! and none of them may clobber the others or read before writing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trove_core::bucket::hash_bucket;
use trove_core::error::{Error, Result};
use trove_core::store::{ColumnValue, KeyValue, Partition, PartitionStore, Row, RowWrite};

use crate::schema::processed_records as schema;

/// Processing state of one record within one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    /// Queued for processing.
    Queued,
    /// Picked up by the topology entry point.
    ProcessedBySpout,
    /// Successfully processed.
    Success,
    /// Processing failed.
    Error,
}

impl RecordState {
    /// The durable string representation stored in the state column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::ProcessedBySpout => "PROCESSED_BY_SPOUT",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    /// Parses the durable string representation.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unknown state string.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "QUEUED" => Ok(Self::Queued),
            "PROCESSED_BY_SPOUT" => Ok(Self::ProcessedBySpout),
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("unknown record state: {other}"))),
        }
    }
}

/// Processing status of one record within one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Task the record belongs to.
    pub task_id: i64,
    /// Record identifier.
    pub record_id: String,
    /// Which (re)attempt this row reflects.
    pub attempt_number: i32,
    /// Destination identifier of the produced representation.
    pub dst_identifier: Option<String>,
    /// Topology that processed the record.
    pub topology_name: Option<String>,
    /// Current processing state.
    pub state: RecordState,
    /// When processing of this record started.
    pub start_time: Option<DateTime<Utc>>,
    /// Free-text diagnostics.
    pub info_text: Option<String>,
    /// Additional free-form info.
    pub additional_informations: Option<String>,
}

/// Store for [`ProcessedRecord`] rows.
///
/// Workers read a record's row through [`find_by_key`](Self::find_by_key)
/// to decide whether it has already been attempted, and report outcomes
/// through the update methods. All calls go through whatever retry
/// decorator wraps the underlying store.
#[derive(Debug)]
pub struct ProcessedRecordStore<S> {
    store: Arc<S>,
}

impl<S> Clone for ProcessedRecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PartitionStore> ProcessedRecordStore<S> {
    /// Creates the store over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn partition(task_id: i64, record_id: &str) -> Partition {
        #[allow(clippy::cast_possible_wrap)]
        let bucket = hash_bucket(record_id, schema::BUCKET_COUNT) as i32;
        Partition::new(
            schema::TABLE,
            vec![KeyValue::BigInt(task_id), KeyValue::Int(bucket)],
        )
    }

    fn clustering(record_id: &str) -> Vec<KeyValue> {
        vec![KeyValue::Text(record_id.to_string())]
    }

    /// Inserts (or fully re-upserts) a record's processing status.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn insert(&self, record: &ProcessedRecord) -> Result<()> {
        let mut write = RowWrite::upsert(Self::clustering(&record.record_id))
            .set(schema::ATTEMPT_NUMBER, ColumnValue::Int(record.attempt_number))
            .set(schema::STATE, ColumnValue::Text(record.state.as_str().into()));
        if let Some(dst) = &record.dst_identifier {
            write = write.set(schema::DST_IDENTIFIER, ColumnValue::Text(dst.clone()));
        }
        if let Some(topology) = &record.topology_name {
            write = write.set(schema::TOPOLOGY_NAME, ColumnValue::Text(topology.clone()));
        }
        if let Some(start) = record.start_time {
            write = write.set(schema::START_TIME, ColumnValue::Timestamp(start));
        }
        if let Some(info) = &record.info_text {
            write = write.set(schema::INFO_TEXT, ColumnValue::Text(info.clone()));
        }
        if let Some(extra) = &record.additional_informations {
            write = write.set(
                schema::ADDITIONAL_INFORMATIONS,
                ColumnValue::Text(extra.clone()),
            );
        }

        self.store
            .write(&Self::partition(record.task_id, &record.record_id), write)
            .await?;
        Ok(())
    }

    /// Updates only the state column of a record.
    ///
    /// Upsert semantics: no prior read, creates the row if absent, touches
    /// nothing else.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_state(
        &self,
        task_id: i64,
        record_id: &str,
        state: RecordState,
    ) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id, record_id),
                RowWrite::upsert(Self::clustering(record_id))
                    .set(schema::STATE, ColumnValue::Text(state.as_str().into())),
            )
            .await?;
        Ok(())
    }

    /// Updates only the start-time column of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_start_time(
        &self,
        task_id: i64,
        record_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id, record_id),
                RowWrite::upsert(Self::clustering(record_id))
                    .set(schema::START_TIME, ColumnValue::Timestamp(start_time)),
            )
            .await?;
        Ok(())
    }

    /// Updates only the attempt-number column of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_attempt_number(
        &self,
        task_id: i64,
        record_id: &str,
        attempt_number: i32,
    ) -> Result<()> {
        self.store
            .write(
                &Self::partition(task_id, record_id),
                RowWrite::upsert(Self::clustering(record_id))
                    .set(schema::ATTEMPT_NUMBER, ColumnValue::Int(attempt_number)),
            )
            .await?;
        Ok(())
    }

    /// Looks up one record's processing status.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails or the stored state
    /// string cannot be parsed.
    pub async fn find_by_key(
        &self,
        task_id: i64,
        record_id: &str,
    ) -> Result<Option<ProcessedRecord>> {
        let row = self
            .store
            .read(
                &Self::partition(task_id, record_id),
                &Self::clustering(record_id),
            )
            .await?;
        row.map(|row| Self::from_row(task_id, record_id, &row))
            .transpose()
    }

    fn from_row(task_id: i64, record_id: &str, row: &Row) -> Result<ProcessedRecord> {
        let state = match row.text(schema::STATE) {
            Some(s) => RecordState::parse(s)?,
            None => RecordState::Queued,
        };
        Ok(ProcessedRecord {
            task_id,
            record_id: record_id.to_string(),
            attempt_number: row.int(schema::ATTEMPT_NUMBER).unwrap_or(0),
            dst_identifier: row.text(schema::DST_IDENTIFIER).map(str::to_string),
            topology_name: row.text(schema::TOPOLOGY_NAME).map(str::to_string),
            state,
            start_time: row.timestamp(schema::START_TIME),
            info_text: row.text(schema::INFO_TEXT).map(str::to_string),
            additional_informations: row
                .text(schema::ADDITIONAL_INFORMATIONS)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::memory::MemoryStore;

    fn store() -> ProcessedRecordStore<MemoryStore> {
        ProcessedRecordStore::new(Arc::new(MemoryStore::new()))
    }

    fn record(task_id: i64, record_id: &str) -> ProcessedRecord {
        ProcessedRecord {
            task_id,
            record_id: record_id.to_string(),
            attempt_number: 1,
            dst_identifier: Some("dst-1".into()),
            topology_name: Some("oai_harvest".into()),
            state: RecordState::Queued,
            start_time: Some(Utc::now()),
            info_text: None,
            additional_informations: None,
        }
    }

    #[tokio::test]
    async fn test_insert_then_find_round_trips() {
        let store = store();
        let rec = record(7, "rec-1");
        store.insert(&rec).await.expect("insert");

        let found = store
            .find_by_key(7, "rec-1")
            .await
            .expect("find")
            .expect("record should exist");
        assert_eq!(found.attempt_number, 1);
        assert_eq!(found.state, RecordState::Queued);
        assert_eq!(found.topology_name.as_deref(), Some("oai_harvest"));
    }

    #[tokio::test]
    async fn test_find_absent_returns_none() {
        let store = store();
        assert!(store
            .find_by_key(7, "missing")
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn test_partial_updates_do_not_clobber() {
        let store = store();
        let rec = record(7, "rec-1");
        store.insert(&rec).await.expect("insert");

        store
            .update_state(7, "rec-1", RecordState::Success)
            .await
            .expect("update state");
        store
            .update_attempt_number(7, "rec-1", 3)
            .await
            .expect("update attempts");

        let found = store
            .find_by_key(7, "rec-1")
            .await
            .expect("find")
            .expect("record");
        assert_eq!(found.state, RecordState::Success);
        assert_eq!(found.attempt_number, 3);
        // Untouched columns survive both updates.
        assert_eq!(found.dst_identifier.as_deref(), Some("dst-1"));
    }

    #[tokio::test]
    async fn test_update_state_creates_row_without_read() {
        let store = store();
        store
            .update_state(9, "fresh", RecordState::ProcessedBySpout)
            .await
            .expect("update");

        let found = store
            .find_by_key(9, "fresh")
            .await
            .expect("find")
            .expect("row created by partial upsert");
        assert_eq!(found.state, RecordState::ProcessedBySpout);
    }

    #[test]
    fn test_record_state_round_trip() {
        for state in [
            RecordState::Queued,
            RecordState::ProcessedBySpout,
            RecordState::Success,
            RecordState::Error,
        ] {
            assert_eq!(RecordState::parse(state.as_str()).expect("parse"), state);
        }
        assert!(RecordState::parse("BOGUS").is_err());
    }
}
