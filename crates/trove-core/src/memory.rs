//! In-memory [`PartitionStore`] backend for testing.
//!
//! Thread-safe via `RwLock`. Not suitable for production: no durability,
//! single-process only. Clustering keys are kept in a `BTreeMap` per
//! partition so range scans come back in clustering-key order, matching
//! what a real partitioned store guarantees.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::store::{
    ColumnValue, Consistency, KeyValue, Partition, PartitionStore, Precondition, Row, RowWrite,
    ScanOrder, ScanRange, WriteOutcome,
};

type StoredRow = HashMap<&'static str, ColumnValue>;
type StoredPartition = BTreeMap<Vec<KeyValue>, StoredRow>;

/// Converts a lock poison error to an internal error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::internal("lock poisoned")
}

/// In-memory store backend.
///
/// ## Example
///
/// ```rust
/// use trove_core::memory::MemoryStore;
///
/// let store = MemoryStore::new();
/// // Use store in tests...
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<Partition, StoredPartition>>,
    consistency: Consistency,
}

impl MemoryStore {
    /// Creates a new empty memory store with the default consistency level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a memory store recording the given consistency level.
    ///
    /// The level is recorded for parity with real backends but changes
    /// nothing in a single-process store.
    #[must_use]
    pub fn with_consistency(consistency: Consistency) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            consistency,
        }
    }

    /// Returns the configured consistency level.
    #[must_use]
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Returns the number of rows currently stored in a partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn row_count(&self, partition: &Partition) -> Result<usize> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions.get(partition).map_or(0, BTreeMap::len))
    }

    fn precondition_holds(existing: Option<&StoredRow>, precondition: Precondition) -> bool {
        match precondition {
            Precondition::None => true,
            Precondition::RowExists => existing.is_some(),
            Precondition::ColumnsUnset(columns) => match existing {
                None => true,
                Some(row) => columns.iter().all(|c| !row.contains_key(c)),
            },
        }
    }

    fn apply_columns(row: &mut StoredRow, columns: Vec<(&'static str, ColumnValue)>) {
        for (name, value) in columns {
            match value {
                ColumnValue::Null => {
                    row.remove(name);
                }
                other => {
                    row.insert(name, other);
                }
            }
        }
    }

    fn within(clustering: &[KeyValue], range: &ScanRange) -> bool {
        if let Some(from) = &range.from {
            if clustering < from.as_slice() {
                return false;
            }
        }
        if let Some(to) = &range.to {
            if clustering > to.as_slice() {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn read(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<Option<Row>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        Ok(partitions
            .get(partition)
            .and_then(|p| p.get(clustering))
            .map(|columns| Row {
                clustering: clustering.to_vec(),
                columns: columns.clone(),
            }))
    }

    async fn write(&self, partition: &Partition, write: RowWrite) -> Result<WriteOutcome> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        let rows = partitions.entry(partition.clone()).or_default();
        let existing = rows.get(&write.clustering);

        if !Self::precondition_holds(existing, write.precondition) {
            return Ok(WriteOutcome::NotApplied);
        }

        let row = rows.entry(write.clustering).or_default();
        Self::apply_columns(row, write.columns);
        Ok(WriteOutcome::Applied)
    }

    async fn write_batch(&self, partition: &Partition, writes: Vec<RowWrite>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut partitions = self.partitions.write().map_err(poison_err)?;
        let rows = partitions.entry(partition.clone()).or_default();
        for write in writes {
            if !Self::precondition_holds(rows.get(&write.clustering), write.precondition) {
                continue;
            }
            let row = rows.entry(write.clustering).or_default();
            Self::apply_columns(row, write.columns);
        }
        Ok(())
    }

    async fn scan(
        &self,
        partition: &Partition,
        range: ScanRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let partitions = self.partitions.read().map_err(poison_err)?;
        let Some(rows) = partitions.get(partition) else {
            return Ok(Vec::new());
        };

        let matching = rows
            .iter()
            .filter(|(clustering, _)| Self::within(clustering, &range))
            .map(|(clustering, columns)| Row {
                clustering: clustering.clone(),
                columns: columns.clone(),
            });

        let mut result: Vec<Row> = match order {
            ScanOrder::Asc => matching.collect(),
            ScanOrder::Desc => {
                let mut v: Vec<Row> = matching.collect();
                v.reverse();
                v
            }
        };

        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn delete_row(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        if let Some(rows) = partitions.get_mut(partition) {
            rows.remove(clustering);
        }
        Ok(())
    }

    async fn delete_partition(&self, partition: &Partition) -> Result<()> {
        self.partitions
            .write()
            .map_err(poison_err)?
            .remove(partition);
        Ok(())
    }

    async fn increment(
        &self,
        partition: &Partition,
        clustering: &[KeyValue],
        column: &'static str,
        delta: i64,
    ) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poison_err)?;
        let rows = partitions.entry(partition.clone()).or_default();
        let row = rows.entry(clustering.to_vec()).or_default();
        let current = match row.get(column) {
            Some(ColumnValue::BigInt(n)) => *n,
            _ => 0,
        };
        row.insert(column, ColumnValue::BigInt(current + delta));
        Ok(())
    }
}
