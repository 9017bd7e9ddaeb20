//! Bulk maintenance over harvested records.
//!
//! Two passes built on the [`coalescer`](crate::coalescer): cleaning one
//! index target's columns across a dataset, and stamping one target's
//! columns on every record that has never been indexed there. Both take a
//! stream of record ids from the caller and batch the writes per bucket.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use trove_core::bucket::hash_bucket;
use trove_core::error::Result;
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Precondition, RowWrite,
};

use crate::coalescer::{BatchCoalescer, WritePlanner};
use crate::harvested::IndexTarget;
use crate::metrics;
use crate::schema::harvested_records as schema;

fn bucket_partition(dataset_id: &str, bucket: u32) -> Partition {
    #[allow(clippy::cast_possible_wrap)]
    let bucket = bucket as i32;
    Partition::new(
        schema::TABLE,
        vec![KeyValue::Text(dataset_id.to_string()), KeyValue::Int(bucket)],
    )
}

/// Plans clean writes: null out one target's (date, md5) pair, only for
/// rows that exist.
struct CleanPlanner {
    dataset_id: String,
    target: IndexTarget,
}

impl WritePlanner for CleanPlanner {
    fn bucket(&self, record_id: &str) -> u32 {
        hash_bucket(record_id, schema::BUCKET_COUNT)
    }

    fn partition(&self, bucket: u32) -> Partition {
        bucket_partition(&self.dataset_id, bucket)
    }

    fn plan(&self, record_id: &str) -> RowWrite {
        RowWrite::upsert(vec![KeyValue::Text(record_id.to_string())])
            .set(self.target.date_column(), ColumnValue::Null)
            .set(self.target.md5_column(), ColumnValue::Null)
            .when(Precondition::RowExists)
    }
}

/// Plans complete writes: stamp one target's (date, md5) pair, only where
/// both columns are still unset.
struct CompletePlanner {
    dataset_id: String,
    target: IndexTarget,
    date: DateTime<Utc>,
    md5: Uuid,
}

impl CompletePlanner {
    const fn unset_columns(target: IndexTarget) -> &'static [&'static str] {
        match target {
            IndexTarget::Preview => &[schema::PREVIEW_HARVEST_DATE, schema::PREVIEW_HARVEST_MD5],
            IndexTarget::Publish => {
                &[schema::PUBLISHED_HARVEST_DATE, schema::PUBLISHED_HARVEST_MD5]
            }
        }
    }
}

impl WritePlanner for CompletePlanner {
    fn bucket(&self, record_id: &str) -> u32 {
        hash_bucket(record_id, schema::BUCKET_COUNT)
    }

    fn partition(&self, bucket: u32) -> Partition {
        bucket_partition(&self.dataset_id, bucket)
    }

    fn plan(&self, record_id: &str) -> RowWrite {
        RowWrite::upsert(vec![KeyValue::Text(record_id.to_string())])
            .set(self.target.date_column(), ColumnValue::Timestamp(self.date))
            .set(self.target.md5_column(), ColumnValue::Uuid(self.md5))
            .when(Precondition::ColumnsUnset(Self::unset_columns(self.target)))
    }
}

/// Bulk-cleans one index target's columns across a dataset.
pub struct CleanUpdater<S: PartitionStore> {
    coalescer: BatchCoalescer<S, CleanPlanner>,
    dataset_id: String,
    target: IndexTarget,
}

impl<S: PartitionStore> CleanUpdater<S> {
    /// Creates an updater that nulls `target`'s pair for every submitted
    /// record of `dataset_id`.
    pub fn new(store: Arc<S>, dataset_id: &str, target: IndexTarget) -> Self {
        Self {
            coalescer: BatchCoalescer::new(
                store,
                CleanPlanner {
                    dataset_id: dataset_id.to_string(),
                    target,
                },
            ),
            dataset_id: dataset_id.to_string(),
            target,
        }
    }

    /// Queues one record for cleaning.
    ///
    /// # Errors
    ///
    /// Returns an error if a triggered bucket flush fails.
    pub async fn execute_record(&mut self, record_id: &str) -> Result<()> {
        self.coalescer.execute_record(record_id).await
    }

    /// Records cleaned so far, not counting anything still pending.
    pub fn cleaned_count(&self) -> u64 {
        self.coalescer.flushed_count()
    }

    /// Flushes remainders and returns the number of records cleaned.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub async fn close(self) -> Result<u64> {
        let cleaned = self.coalescer.close().await?;
        metrics::record_records_cleaned(cleaned);
        info!(
            dataset_id = %self.dataset_id,
            target = ?self.target,
            cleaned,
            "clean pass finished"
        );
        Ok(cleaned)
    }
}

/// Bulk-stamps one index target's columns across a dataset, skipping
/// records a concurrent indexing run already stamped.
pub struct CompleteUpdater<S: PartitionStore> {
    coalescer: BatchCoalescer<S, CompletePlanner>,
    dataset_id: String,
    target: IndexTarget,
}

impl<S: PartitionStore> CompleteUpdater<S> {
    /// Creates an updater that stamps `(date, md5)` on every submitted
    /// record of `dataset_id` whose `target` pair is still unset.
    pub fn new(
        store: Arc<S>,
        dataset_id: &str,
        target: IndexTarget,
        date: DateTime<Utc>,
        md5: Uuid,
    ) -> Self {
        Self {
            coalescer: BatchCoalescer::new(
                store,
                CompletePlanner {
                    dataset_id: dataset_id.to_string(),
                    target,
                    date,
                    md5,
                },
            ),
            dataset_id: dataset_id.to_string(),
            target,
        }
    }

    /// Queues one record for stamping.
    ///
    /// # Errors
    ///
    /// Returns an error if a triggered bucket flush fails.
    pub async fn execute_record(&mut self, record_id: &str) -> Result<()> {
        self.coalescer.execute_record(record_id).await
    }

    /// Records submitted so far, not counting anything still pending.
    pub fn completed_count(&self) -> u64 {
        self.coalescer.flushed_count()
    }

    /// Flushes remainders and returns the number of records submitted.
    ///
    /// Per-record conditional outcomes are not reported back by batch
    /// writes; the count is submitted records, not applied ones.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub async fn close(self) -> Result<u64> {
        let completed = self.coalescer.close().await?;
        metrics::record_records_completed(completed);
        info!(
            dataset_id = %self.dataset_id,
            target = ?self.target,
            completed,
            "complete pass finished"
        );
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvested::{HarvestedRecord, HarvestedRecordStore};
    use trove_core::memory::MemoryStore;

    #[tokio::test]
    async fn test_clean_updater_nulls_existing_rows_only() {
        let backend = Arc::new(MemoryStore::new());
        let records = HarvestedRecordStore::new(backend.clone());

        let mut existing = HarvestedRecord::from_latest_harvest("ds-1", "rec-1", Utc::now(), None);
        existing.preview_harvest_date = Some(Utc::now());
        existing.preview_harvest_md5 = Some(Uuid::new_v4());
        records.insert(&existing).await.expect("insert");

        let mut updater = CleanUpdater::new(backend, "ds-1", IndexTarget::Preview);
        updater.execute_record("rec-1").await.expect("execute");
        updater.execute_record("never-seen").await.expect("execute");
        let cleaned = updater.close().await.expect("close");
        assert_eq!(cleaned, 2);

        let found = records
            .find("ds-1", "rec-1")
            .await
            .expect("find")
            .expect("record");
        assert!(found.preview_harvest_date.is_none());
        assert!(found.latest_harvest_date.is_some());
        // The never-harvested id must not gain a ghost row.
        assert!(records
            .find("ds-1", "never-seen")
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn test_complete_updater_skips_already_stamped() {
        let backend = Arc::new(MemoryStore::new());
        let records = HarvestedRecordStore::new(backend.clone());

        let stamped_md5 = Uuid::new_v4();
        let mut stamped = HarvestedRecord::from_latest_harvest("ds-1", "rec-1", Utc::now(), None);
        stamped.published_harvest_date = Some(Utc::now());
        stamped.published_harvest_md5 = Some(stamped_md5);
        records.insert(&stamped).await.expect("insert");

        let empty = HarvestedRecord::from_latest_harvest("ds-1", "rec-2", Utc::now(), None);
        records.insert(&empty).await.expect("insert");

        let pass_md5 = Uuid::new_v4();
        let mut updater =
            CompleteUpdater::new(backend, "ds-1", IndexTarget::Publish, Utc::now(), pass_md5);
        updater.execute_record("rec-1").await.expect("execute");
        updater.execute_record("rec-2").await.expect("execute");
        updater.close().await.expect("close");

        let first = records
            .find("ds-1", "rec-1")
            .await
            .expect("find")
            .expect("record");
        assert_eq!(first.published_harvest_md5, Some(stamped_md5));

        let second = records
            .find("ds-1", "rec-2")
            .await
            .expect("find")
            .expect("record");
        assert_eq!(second.published_harvest_md5, Some(pass_md5));
    }

    #[tokio::test]
    async fn test_clean_updater_large_dataset_flushes_in_batches() {
        let backend = Arc::new(MemoryStore::new());
        let records = HarvestedRecordStore::new(backend.clone());
        for i in 0..1500 {
            let mut record = HarvestedRecord::from_latest_harvest(
                "ds-big",
                format!("rec-{i}"),
                Utc::now(),
                None,
            );
            record.preview_harvest_date = Some(Utc::now());
            records.insert(&record).await.expect("insert");
        }

        let mut updater = CleanUpdater::new(backend, "ds-big", IndexTarget::Preview);
        for i in 0..1500 {
            updater
                .execute_record(&format!("rec-{i}"))
                .await
                .expect("execute");
        }
        let cleaned = updater.close().await.expect("close");
        assert_eq!(cleaned, 1500);

        let scanned = records
            .scan_dataset("ds-big")
            .collect()
            .await
            .expect("scan");
        assert_eq!(scanned.len(), 1500);
        assert!(scanned.iter().all(|r| r.preview_harvest_date.is_none()));
    }
}
