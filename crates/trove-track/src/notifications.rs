//! Append-only per-task notification log.
//!
//! One row per processed resource, keyed by a task-scoped sequence number
//! and bucketed by `floor(resource_num / 10000)`. Sequence bucketing keeps
//! each partition bounded while preserving global order, and makes "how
//! many resources has this task processed" answerable by walking buckets
//! upward until the first empty one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use trove_core::bucket::sequence_bucket;
use trove_core::error::Result;
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Row, RowWrite, ScanOrder, ScanRange,
};

use crate::metrics;
use crate::processed::RecordState;
use crate::schema::notifications as schema;

/// One processed-resource notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Task the notification belongs to.
    pub task_id: i64,
    /// Task-scoped sequence number of the resource.
    pub resource_num: i64,
    /// Topology that produced the notification.
    pub topology_name: String,
    /// Resource identifier.
    pub resource: String,
    /// Outcome state.
    pub state: RecordState,
    /// Free-text diagnostics.
    pub info_text: Option<String>,
    /// Structured additional information.
    pub additional_informations: BTreeMap<String, String>,
    /// Identifier of the produced result, if any.
    pub result_resource: Option<String>,
}

impl Notification {
    /// A minimal notification with empty additional information.
    #[must_use]
    pub fn new(
        task_id: i64,
        resource_num: i64,
        topology_name: impl Into<String>,
        resource: impl Into<String>,
        state: RecordState,
    ) -> Self {
        Self {
            task_id,
            resource_num,
            topology_name: topology_name.into(),
            resource: resource.into(),
            state,
            info_text: None,
            additional_informations: BTreeMap::new(),
            result_resource: None,
        }
    }

    /// Sets the human-readable state detail.
    #[must_use]
    pub fn with_state_description(mut self, description: impl Into<String>) -> Self {
        self.additional_informations
            .insert(schema::STATE_DESCRIPTION_KEY.to_string(), description.into());
        self
    }

    /// Sets the processing duration, in milliseconds.
    #[must_use]
    pub fn with_processing_time(mut self, millis: i64) -> Self {
        self.additional_informations
            .insert(schema::PROCESSING_TIME_KEY.to_string(), millis.to_string());
        self
    }

    /// Sets the public record identifier.
    #[must_use]
    pub fn with_europeana_id(mut self, id: impl Into<String>) -> Self {
        self.additional_informations
            .insert(schema::EUROPEANA_ID_KEY.to_string(), id.into());
        self
    }
}

/// Append-only store for [`Notification`] rows.
#[derive(Debug)]
pub struct NotificationLog<S> {
    store: Arc<S>,
}

impl<S> Clone for NotificationLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PartitionStore> NotificationLog<S> {
    /// Creates the log over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn partition(task_id: i64, bucket: i64) -> Partition {
        Partition::new(
            schema::TABLE,
            vec![KeyValue::BigInt(task_id), KeyValue::BigInt(bucket)],
        )
    }

    /// Appends one notification.
    ///
    /// Sequence numbers are assigned by the caller; appending the same
    /// `resource_num` twice overwrites the earlier row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn append(&self, notification: &Notification) -> Result<()> {
        let bucket = sequence_bucket(notification.resource_num, schema::BUCKET_SIZE);
        let mut write = RowWrite::upsert(vec![KeyValue::BigInt(notification.resource_num)])
            .set(
                schema::TOPOLOGY_NAME,
                ColumnValue::Text(notification.topology_name.clone()),
            )
            .set(
                schema::RESOURCE,
                ColumnValue::Text(notification.resource.clone()),
            )
            .set(
                schema::STATE,
                ColumnValue::Text(notification.state.as_str().into()),
            )
            .set(
                schema::ADDITIONAL_INFORMATIONS,
                ColumnValue::Map(notification.additional_informations.clone()),
            );
        if let Some(info) = &notification.info_text {
            write = write.set(schema::INFO_TEXT, ColumnValue::Text(info.clone()));
        }
        if let Some(result) = &notification.result_resource {
            write = write.set(schema::RESULT_RESOURCE, ColumnValue::Text(result.clone()));
        }

        self.store
            .write(&Self::partition(notification.task_id, bucket), write)
            .await?;
        metrics::record_notification_appended();
        Ok(())
    }

    /// The highest sequence number stored in one bucket, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn latest_sequence_in_bucket(
        &self,
        task_id: i64,
        bucket: i64,
    ) -> Result<Option<i64>> {
        let rows = self
            .store
            .scan(
                &Self::partition(task_id, bucket),
                ScanRange::all(),
                ScanOrder::Desc,
                Some(1),
            )
            .await?;
        Ok(rows.first().and_then(Self::sequence_of))
    }

    /// The number of resources the task has processed.
    ///
    /// Walks buckets upward from zero and stops at the first empty one,
    /// returning the highest sequence number seen so far. Sequence numbers
    /// start at 1, so that number is also the count. Returns 0 for a task
    /// with no notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn count_processed(&self, task_id: i64) -> Result<i64> {
        let mut last_seen = 0;
        let mut bucket = 0;
        loop {
            match self.latest_sequence_in_bucket(task_id, bucket).await? {
                Some(sequence) => {
                    last_seen = sequence;
                    bucket += 1;
                }
                None => {
                    debug!(task_id, buckets_walked = bucket, count = last_seen, "counted notifications");
                    return Ok(last_seen);
                }
            }
        }
    }

    /// Notifications with sequence numbers in the inclusive `[from, to]`
    /// range, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails or `from > to`.
    pub async fn range(&self, task_id: i64, from: i64, to: i64) -> Result<Vec<Notification>> {
        if from > to {
            return Err(trove_core::Error::InvalidInput(format!(
                "invalid notification range: {from} > {to}"
            )));
        }
        let first_bucket = sequence_bucket(from, schema::BUCKET_SIZE);
        let last_bucket = sequence_bucket(to, schema::BUCKET_SIZE);

        let mut out = Vec::new();
        for bucket in first_bucket..=last_bucket {
            let low = from.max(bucket * schema::BUCKET_SIZE);
            let high = to.min((bucket + 1) * schema::BUCKET_SIZE - 1);
            let rows = self
                .store
                .scan(
                    &Self::partition(task_id, bucket),
                    ScanRange::between(vec![KeyValue::BigInt(low)], vec![KeyValue::BigInt(high)]),
                    ScanOrder::Asc,
                    None,
                )
                .await?;
            for row in rows {
                if let Some(notification) = Self::from_row(task_id, &row) {
                    out.push(notification);
                }
            }
        }
        Ok(out)
    }

    /// Removes every notification of a task.
    ///
    /// Buckets are deleted from the highest populated one down to zero, so
    /// an interrupted deletion never leaves a gap that would make the
    /// bucket walk in [`count_processed`](Self::count_processed) stop
    /// early while later buckets still hold rows. The last bucket is
    /// `sequence_bucket(count)` rather than `count - 1`: when the highest
    /// sequence number sits exactly on a bucket boundary, `count - 1`
    /// would miss the top bucket and orphan its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn delete_all(&self, task_id: i64) -> Result<()> {
        let count = self.count_processed(task_id).await?;
        let last_bucket = sequence_bucket(count, schema::BUCKET_SIZE);
        for bucket in (0..=last_bucket).rev() {
            self.store
                .delete_partition(&Self::partition(task_id, bucket))
                .await?;
        }
        Ok(())
    }

    fn sequence_of(row: &Row) -> Option<i64> {
        match row.clustering.first() {
            Some(KeyValue::BigInt(n)) => Some(*n),
            _ => None,
        }
    }

    fn from_row(task_id: i64, row: &Row) -> Option<Notification> {
        let resource_num = Self::sequence_of(row)?;
        let state = RecordState::parse(row.text(schema::STATE)?).ok()?;
        Some(Notification {
            task_id,
            resource_num,
            topology_name: row.text(schema::TOPOLOGY_NAME).unwrap_or_default().to_string(),
            resource: row.text(schema::RESOURCE).unwrap_or_default().to_string(),
            state,
            info_text: row.text(schema::INFO_TEXT).map(str::to_string),
            additional_informations: row
                .map(schema::ADDITIONAL_INFORMATIONS)
                .cloned()
                .unwrap_or_default(),
            result_resource: row.text(schema::RESULT_RESOURCE).map(str::to_string),
        })
    }
}
