//! Batching of per-record writes into single-partition batches.
//!
//! Bulk maintenance over a dataset touches every record with the same small
//! write. Issuing those one at a time is dominated by round trips, and an
//! unconstrained multi-partition batch is an anti-pattern in the backend.
//! The coalescer groups pending record ids by their hash bucket and flushes
//! each bucket as one unlogged single-partition batch once it reaches
//! [`BATCH_SIZE`] entries.
//!
//! A coalescer is owned by one maintenance pass and is not shared between
//! tasks. Dropping it without calling [`BatchCoalescer::close`] loses the
//! unflushed remainder.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use trove_core::error::Result;
use trove_core::store::{Partition, PartitionStore, RowWrite};

/// Records per bucket that trigger a flush.
pub const BATCH_SIZE: usize = 1000;

/// Plans the per-record write for one kind of bulk maintenance.
///
/// A planner is pure: it maps a record id to its bucket, a bucket to its
/// partition, and a record id to the write to apply. The coalescer owns
/// the batching; the planner owns the semantics.
pub trait WritePlanner: Send + Sync {
    /// The bucket the record id routes to.
    fn bucket(&self, record_id: &str) -> u32;

    /// The partition backing the given bucket.
    fn partition(&self, bucket: u32) -> Partition;

    /// The write to apply to one record.
    fn plan(&self, record_id: &str) -> RowWrite;
}

/// Groups per-record writes by bucket and flushes full buckets as
/// single-partition batches.
pub struct BatchCoalescer<S, P> {
    store: Arc<S>,
    planner: P,
    pending: HashMap<u32, Vec<String>>,
    flushed: u64,
}

impl<S: PartitionStore, P: WritePlanner> BatchCoalescer<S, P> {
    /// Creates a coalescer over a shared backend.
    pub fn new(store: Arc<S>, planner: P) -> Self {
        Self {
            store,
            planner,
            pending: HashMap::new(),
            flushed: 0,
        }
    }

    /// Queues the planned write for one record, flushing its bucket if the
    /// bucket has reached [`BATCH_SIZE`] pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing the bucket fails. The flushed bucket's
    /// pending list is consumed either way.
    pub async fn execute_record(&mut self, record_id: &str) -> Result<()> {
        let bucket = self.planner.bucket(record_id);
        let pending = self.pending.entry(bucket).or_default();
        pending.push(record_id.to_string());
        if pending.len() >= BATCH_SIZE {
            self.flush_bucket(bucket).await?;
        }
        Ok(())
    }

    /// Flushes any remaining partial buckets and returns the total number
    /// of records written over the coalescer's lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing a bucket fails.
    pub async fn close(mut self) -> Result<u64> {
        let mut buckets: Vec<u32> = self.pending.keys().copied().collect();
        buckets.sort_unstable();
        for bucket in buckets {
            self.flush_bucket(bucket).await?;
        }
        Ok(self.flushed)
    }

    /// Records written so far, not counting anything still pending.
    pub fn flushed_count(&self) -> u64 {
        self.flushed
    }

    async fn flush_bucket(&mut self, bucket: u32) -> Result<()> {
        let Some(record_ids) = self.pending.remove(&bucket) else {
            return Ok(());
        };
        if record_ids.is_empty() {
            return Ok(());
        }
        let partition = self.planner.partition(bucket);
        let writes: Vec<RowWrite> = record_ids
            .iter()
            .map(|record_id| self.planner.plan(record_id))
            .collect();
        let count = writes.len() as u64;
        self.store.write_batch(&partition, writes).await?;
        self.flushed += count;
        metrics::counter!(crate::metrics::COALESCER_FLUSHES).increment(1);
        debug!(bucket, records = count, table = partition.table, "flushed bucket batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use trove_core::bucket::hash_bucket;
    use trove_core::error::Result;
    use trove_core::memory::MemoryStore;
    use trove_core::store::{
        ColumnValue, KeyValue, PartitionStore, Row, ScanOrder, ScanRange, WriteOutcome,
    };

    /// Delegating backend that counts batch submissions.
    #[derive(Debug, Default)]
    struct BatchCountingStore {
        inner: MemoryStore,
        batches: AtomicU32,
    }

    #[async_trait]
    impl PartitionStore for BatchCountingStore {
        async fn read(
            &self,
            partition: &Partition,
            clustering: &[KeyValue],
        ) -> Result<Option<Row>> {
            self.inner.read(partition, clustering).await
        }

        async fn write(&self, partition: &Partition, write: RowWrite) -> Result<WriteOutcome> {
            self.inner.write(partition, write).await
        }

        async fn write_batch(&self, partition: &Partition, writes: Vec<RowWrite>) -> Result<()> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.write_batch(partition, writes).await
        }

        async fn scan(
            &self,
            partition: &Partition,
            range: ScanRange,
            order: ScanOrder,
            limit: Option<usize>,
        ) -> Result<Vec<Row>> {
            self.inner.scan(partition, range, order, limit).await
        }

        async fn delete_row(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<()> {
            self.inner.delete_row(partition, clustering).await
        }

        async fn delete_partition(&self, partition: &Partition) -> Result<()> {
            self.inner.delete_partition(partition).await
        }

        async fn increment(
            &self,
            partition: &Partition,
            clustering: &[KeyValue],
            column: &'static str,
            delta: i64,
        ) -> Result<()> {
            self.inner.increment(partition, clustering, column, delta).await
        }
    }

    /// Planner that routes every record to bucket zero.
    struct SingleBucketPlanner;

    impl WritePlanner for SingleBucketPlanner {
        fn bucket(&self, _record_id: &str) -> u32 {
            0
        }

        fn partition(&self, _bucket: u32) -> Partition {
            Partition::new("marks", vec![KeyValue::Int(0)])
        }

        fn plan(&self, record_id: &str) -> RowWrite {
            RowWrite::upsert(vec![KeyValue::Text(record_id.to_string())])
                .set("marked", ColumnValue::Int(1))
        }
    }

    struct MarkPlanner;

    impl WritePlanner for MarkPlanner {
        fn bucket(&self, record_id: &str) -> u32 {
            hash_bucket(record_id, 4)
        }

        fn partition(&self, bucket: u32) -> Partition {
            #[allow(clippy::cast_possible_wrap)]
            let bucket = bucket as i32;
            Partition::new("marks", vec![KeyValue::Int(bucket)])
        }

        fn plan(&self, record_id: &str) -> RowWrite {
            RowWrite::upsert(vec![KeyValue::Text(record_id.to_string())])
                .set("marked", ColumnValue::Int(1))
        }
    }

    async fn rows_in(store: &MemoryStore, bucket: u32) -> usize {
        #[allow(clippy::cast_possible_wrap)]
        let partition = Partition::new("marks", vec![KeyValue::Int(bucket as i32)]);
        store
            .scan(&partition, ScanRange::all(), ScanOrder::Asc, None)
            .await
            .expect("scan")
            .len()
    }

    #[tokio::test]
    async fn test_nothing_written_before_threshold() {
        let store = Arc::new(MemoryStore::new());
        let mut coalescer = BatchCoalescer::new(store.clone(), MarkPlanner);
        for i in 0..10 {
            coalescer
                .execute_record(&format!("rec-{i}"))
                .await
                .expect("execute");
        }
        assert_eq!(coalescer.flushed_count(), 0);
        let written: usize = {
            let mut total = 0;
            for bucket in 0..4 {
                total += rows_in(&store, bucket).await;
            }
            total
        };
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_bucket_flushes_at_threshold() {
        let store = Arc::new(MemoryStore::new());
        let mut coalescer = BatchCoalescer::new(store.clone(), MarkPlanner);
        // Push records into a single bucket until it flushes exactly once.
        let bucket = MarkPlanner.bucket("seed");
        let mut sent = 0;
        let mut i = 0;
        while sent < BATCH_SIZE {
            let id = format!("rec-{i}");
            i += 1;
            if MarkPlanner.bucket(&id) != bucket {
                continue;
            }
            coalescer.execute_record(&id).await.expect("execute");
            sent += 1;
        }
        assert_eq!(coalescer.flushed_count(), BATCH_SIZE as u64);
        assert_eq!(rows_in(&store, bucket).await, BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_close_flushes_remainders_and_counts_total() {
        let store = Arc::new(MemoryStore::new());
        let mut coalescer = BatchCoalescer::new(store.clone(), MarkPlanner);
        for i in 0..2500 {
            coalescer
                .execute_record(&format!("rec-{i}"))
                .await
                .expect("execute");
        }
        let total = coalescer.close().await.expect("close");
        assert_eq!(total, 2500);

        let mut written = 0;
        for bucket in 0..4 {
            written += rows_in(&store, bucket).await;
        }
        assert_eq!(written, 2500);
    }

    #[tokio::test]
    async fn test_fifteen_hundred_records_issue_two_batches() {
        let store = Arc::new(BatchCountingStore::default());
        let mut coalescer = BatchCoalescer::new(store.clone(), SingleBucketPlanner);
        for i in 0..1500 {
            coalescer
                .execute_record(&format!("rec-{i}"))
                .await
                .expect("execute");
        }
        // Threshold flush of the first 1000.
        assert_eq!(store.batches.load(Ordering::SeqCst), 1);

        let total = coalescer.close().await.expect("close");
        assert_eq!(total, 1500);
        // Close flushes the 500 remainder as exactly one more batch.
        assert_eq!(store.batches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_with_nothing_pending() {
        let store = Arc::new(MemoryStore::new());
        let coalescer = BatchCoalescer::new(store, MarkPlanner);
        assert_eq!(coalescer.close().await.expect("close"), 0);
    }
}
