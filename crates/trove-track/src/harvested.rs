//! Per-dataset harvesting and indexing metadata.
//!
//! One row per `(metis_dataset_id, record_local_id)` across 64 hash buckets
//! of the local id. Each row tracks three (date, md5) pairs: the latest
//! harvest plus one pair per index target. Incremental harvesting compares
//! the stored checksum against freshly-harvested content to skip unchanged
//! records, and the conditional writes here are what make that comparison
//! safe against concurrent indexing runs.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trove_core::bucket::hash_bucket;
use trove_core::error::Result;
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Precondition, Row, RowWrite, ScanOrder,
    ScanRange, WriteOutcome,
};

use crate::schema::harvested_records as schema;

/// The two indexing destinations a record can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexTarget {
    /// The preview collection.
    Preview,
    /// The publicly published collection.
    Publish,
}

impl IndexTarget {
    /// The harvest-date column for this target.
    #[must_use]
    pub const fn date_column(self) -> &'static str {
        match self {
            Self::Preview => schema::PREVIEW_HARVEST_DATE,
            Self::Publish => schema::PUBLISHED_HARVEST_DATE,
        }
    }

    /// The checksum column for this target.
    #[must_use]
    pub const fn md5_column(self) -> &'static str {
        match self {
            Self::Preview => schema::PREVIEW_HARVEST_MD5,
            Self::Publish => schema::PUBLISHED_HARVEST_MD5,
        }
    }
}

/// Harvesting and indexing metadata for one record of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedRecord {
    /// Dataset the record belongs to.
    pub metis_dataset_id: String,
    /// Record identifier local to the dataset.
    pub record_local_id: String,
    /// When the record was last harvested.
    pub latest_harvest_date: Option<DateTime<Utc>>,
    /// Checksum of the most recently harvested content.
    pub latest_harvest_md5: Option<Uuid>,
    /// When the record was last indexed to preview.
    pub preview_harvest_date: Option<DateTime<Utc>>,
    /// Checksum of the content last indexed to preview.
    pub preview_harvest_md5: Option<Uuid>,
    /// When the record was last indexed to publish.
    pub published_harvest_date: Option<DateTime<Utc>>,
    /// Checksum of the content last indexed to publish.
    pub published_harvest_md5: Option<Uuid>,
}

impl HarvestedRecord {
    /// A record with only the latest-harvest pair populated.
    #[must_use]
    pub fn from_latest_harvest(
        metis_dataset_id: impl Into<String>,
        record_local_id: impl Into<String>,
        harvest_date: DateTime<Utc>,
        md5: Option<Uuid>,
    ) -> Self {
        Self {
            metis_dataset_id: metis_dataset_id.into(),
            record_local_id: record_local_id.into(),
            latest_harvest_date: Some(harvest_date),
            latest_harvest_md5: md5,
            preview_harvest_date: None,
            preview_harvest_md5: None,
            published_harvest_date: None,
            published_harvest_md5: None,
        }
    }

    /// The (date, md5) pair for the given target.
    #[must_use]
    pub fn target_pair(&self, target: IndexTarget) -> (Option<DateTime<Utc>>, Option<Uuid>) {
        match target {
            IndexTarget::Preview => (self.preview_harvest_date, self.preview_harvest_md5),
            IndexTarget::Publish => (self.published_harvest_date, self.published_harvest_md5),
        }
    }
}

/// Store for [`HarvestedRecord`] rows.
#[derive(Debug)]
pub struct HarvestedRecordStore<S> {
    store: Arc<S>,
}

impl<S> Clone for HarvestedRecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

fn column_pair(date: Option<DateTime<Utc>>, md5: Option<Uuid>) -> (ColumnValue, ColumnValue) {
    (
        date.map_or(ColumnValue::Null, ColumnValue::Timestamp),
        md5.map_or(ColumnValue::Null, ColumnValue::Uuid),
    )
}

impl<S: PartitionStore> HarvestedRecordStore<S> {
    /// Creates the store over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn partition(dataset_id: &str, bucket: u32) -> Partition {
        #[allow(clippy::cast_possible_wrap)]
        let bucket = bucket as i32;
        Partition::new(
            schema::TABLE,
            vec![KeyValue::Text(dataset_id.to_string()), KeyValue::Int(bucket)],
        )
    }

    fn record_partition(dataset_id: &str, local_id: &str) -> Partition {
        Self::partition(dataset_id, hash_bucket(local_id, schema::BUCKET_COUNT))
    }

    fn clustering(local_id: &str) -> Vec<KeyValue> {
        vec![KeyValue::Text(local_id.to_string())]
    }

    /// Writes all six metadata columns of a record.
    ///
    /// Absent pairs are written as explicit nulls, so this replaces the
    /// record's metadata in full rather than merging with what is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn insert(&self, record: &HarvestedRecord) -> Result<()> {
        let (latest_date, latest_md5) =
            column_pair(record.latest_harvest_date, record.latest_harvest_md5);
        let (preview_date, preview_md5) =
            column_pair(record.preview_harvest_date, record.preview_harvest_md5);
        let (published_date, published_md5) =
            column_pair(record.published_harvest_date, record.published_harvest_md5);

        let write = RowWrite::upsert(Self::clustering(&record.record_local_id))
            .set(schema::LATEST_HARVEST_DATE, latest_date)
            .set(schema::LATEST_HARVEST_MD5, latest_md5)
            .set(schema::PREVIEW_HARVEST_DATE, preview_date)
            .set(schema::PREVIEW_HARVEST_MD5, preview_md5)
            .set(schema::PUBLISHED_HARVEST_DATE, published_date)
            .set(schema::PUBLISHED_HARVEST_MD5, published_md5);

        self.store
            .write(
                &Self::record_partition(&record.metis_dataset_id, &record.record_local_id),
                write,
            )
            .await?;
        Ok(())
    }

    /// Updates only the latest-harvest pair of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_latest(
        &self,
        dataset_id: &str,
        local_id: &str,
        harvest_date: DateTime<Utc>,
        md5: Uuid,
    ) -> Result<()> {
        self.store
            .write(
                &Self::record_partition(dataset_id, local_id),
                RowWrite::upsert(Self::clustering(local_id))
                    .set(
                        schema::LATEST_HARVEST_DATE,
                        ColumnValue::Timestamp(harvest_date),
                    )
                    .set(schema::LATEST_HARVEST_MD5, ColumnValue::Uuid(md5)),
            )
            .await?;
        Ok(())
    }

    /// Updates only the published-harvest date of a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn update_published_date(
        &self,
        dataset_id: &str,
        local_id: &str,
        date: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .write(
                &Self::record_partition(dataset_id, local_id),
                RowWrite::upsert(Self::clustering(local_id))
                    .set(schema::PUBLISHED_HARVEST_DATE, ColumnValue::Timestamp(date)),
            )
            .await?;
        Ok(())
    }

    /// Nulls out one target's (date, md5) pair, only if the row exists.
    ///
    /// Conditioned on row existence so that de-indexing a record that was
    /// never harvested does not materialize a ghost row.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn clean_indexed_columns(
        &self,
        dataset_id: &str,
        local_id: &str,
        target: IndexTarget,
    ) -> Result<WriteOutcome> {
        self.store
            .write(
                &Self::record_partition(dataset_id, local_id),
                RowWrite::upsert(Self::clustering(local_id))
                    .set(target.date_column(), ColumnValue::Null)
                    .set(target.md5_column(), ColumnValue::Null)
                    .when(Precondition::RowExists),
            )
            .await
    }

    /// Sets one target's (date, md5) pair, only if both columns are unset.
    ///
    /// A concurrent indexing run that already stamped the pair wins; the
    /// returned [`WriteOutcome::NotApplied`] is the normal signal for that
    /// and not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn complete_if_empty(
        &self,
        dataset_id: &str,
        local_id: &str,
        target: IndexTarget,
        date: DateTime<Utc>,
        md5: Uuid,
    ) -> Result<WriteOutcome> {
        let unset: &'static [&'static str] = match target {
            IndexTarget::Preview => &[schema::PREVIEW_HARVEST_DATE, schema::PREVIEW_HARVEST_MD5],
            IndexTarget::Publish => {
                &[schema::PUBLISHED_HARVEST_DATE, schema::PUBLISHED_HARVEST_MD5]
            }
        };
        self.store
            .write(
                &Self::record_partition(dataset_id, local_id),
                RowWrite::upsert(Self::clustering(local_id))
                    .set(target.date_column(), ColumnValue::Timestamp(date))
                    .set(target.md5_column(), ColumnValue::Uuid(md5))
                    .when(Precondition::ColumnsUnset(unset)),
            )
            .await
    }

    /// Looks up one record's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn find(
        &self,
        dataset_id: &str,
        local_id: &str,
    ) -> Result<Option<HarvestedRecord>> {
        let row = self
            .store
            .read(
                &Self::record_partition(dataset_id, local_id),
                &Self::clustering(local_id),
            )
            .await?;
        Ok(row.map(|row| Self::from_row(dataset_id, local_id, &row)))
    }

    /// Removes one record's row entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn delete_record(&self, dataset_id: &str, local_id: &str) -> Result<()> {
        self.store
            .delete_row(
                &Self::record_partition(dataset_id, local_id),
                &Self::clustering(local_id),
            )
            .await
    }

    /// Streams every record of a dataset, bucket by bucket.
    ///
    /// Records come back ordered by local id within each bucket; there is
    /// no global order across buckets. Empty buckets are skipped.
    #[must_use]
    pub fn scan_dataset(&self, dataset_id: &str) -> DatasetScan<S> {
        DatasetScan {
            store: self.store.clone(),
            dataset_id: dataset_id.to_string(),
            next_bucket: 0,
            buffer: VecDeque::new(),
        }
    }

    fn from_row(dataset_id: &str, local_id: &str, row: &Row) -> HarvestedRecord {
        HarvestedRecord {
            metis_dataset_id: dataset_id.to_string(),
            record_local_id: local_id.to_string(),
            latest_harvest_date: row.timestamp(schema::LATEST_HARVEST_DATE),
            latest_harvest_md5: row.uuid(schema::LATEST_HARVEST_MD5),
            preview_harvest_date: row.timestamp(schema::PREVIEW_HARVEST_DATE),
            preview_harvest_md5: row.uuid(schema::PREVIEW_HARVEST_MD5),
            published_harvest_date: row.timestamp(schema::PUBLISHED_HARVEST_DATE),
            published_harvest_md5: row.uuid(schema::PUBLISHED_HARVEST_MD5),
        }
    }
}

/// Cursor over all records of one dataset.
///
/// Produced by [`HarvestedRecordStore::scan_dataset`]. Each bucket is read
/// with an independent store call, so a retry decorator retries per bucket.
#[derive(Debug)]
pub struct DatasetScan<S> {
    store: Arc<S>,
    dataset_id: String,
    next_bucket: u32,
    buffer: VecDeque<HarvestedRecord>,
}

impl<S: PartitionStore> DatasetScan<S> {
    /// The next record, or `None` once all buckets are exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a bucket fails.
    pub async fn next(&mut self) -> Result<Option<HarvestedRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.next_bucket >= schema::BUCKET_COUNT {
                return Ok(None);
            }
            let partition =
                HarvestedRecordStore::<S>::partition(&self.dataset_id, self.next_bucket);
            self.next_bucket += 1;

            let rows = self
                .store
                .scan(&partition, ScanRange::all(), ScanOrder::Asc, None)
                .await?;
            for row in rows {
                let Some(KeyValue::Text(local_id)) = row.clustering.first().cloned() else {
                    continue;
                };
                self.buffer.push_back(HarvestedRecordStore::<S>::from_row(
                    &self.dataset_id,
                    &local_id,
                    &row,
                ));
            }
        }
    }

    /// Drains the cursor into a vector.
    ///
    /// # Errors
    ///
    /// Returns an error if reading a bucket fails.
    pub async fn collect(mut self) -> Result<Vec<HarvestedRecord>> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }
}
