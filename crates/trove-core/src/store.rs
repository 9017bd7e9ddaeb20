//! Partitioned column-store abstraction.
//!
//! This module defines the store contract every tracking component is built
//! on. It is deliberately *not* a general-purpose database interface: it
//! captures exactly the access pattern the tracking stores need from a
//! partitioned key-value/column store:
//!
//! - a two-part key: a partition key plus an ordered clustering key;
//! - partial-column upserts that never clobber unrelated columns;
//! - range scans within one partition, ordered by the clustering key;
//! - single-partition conditional ("compare-and-set") writes;
//! - single-partition unlogged batches;
//! - counter-column increments.
//!
//! There are no multi-partition transactions and no global secondary
//! indexes; anything that looks like one (the tasks-by-state index) is
//! maintained explicitly by the application.
//!
//! ## Conditional writes
//!
//! A conditional write that does not apply is a **normal outcome**, not an
//! error: it is reported as [`WriteOutcome::NotApplied`] and callers are
//! expected to silently accept it. Implementations must evaluate the
//! precondition and the write atomically within the partition; callers must
//! never emulate this with a read followed by a write.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Consistency level applied by a backend to its reads and writes.
///
/// Configured once at backend construction and applied to every statement
/// the backend issues. The in-memory backend records the level but has
/// nothing to tune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// A single replica acknowledges.
    One,
    /// A quorum of replicas in the local datacenter acknowledges.
    LocalQuorum,
    /// A quorum of all replicas acknowledges.
    #[default]
    Quorum,
    /// Every replica acknowledges.
    All,
}

/// A value usable as a partition- or clustering-key component.
///
/// Totally ordered so that clustering keys sort; the derived ordering
/// compares variants first, which is irrelevant in practice because one key
/// position always holds one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    /// UTF-8 text key component.
    Text(String),
    /// 64-bit signed integer key component.
    BigInt(i64),
    /// 32-bit signed integer key component (bucket numbers).
    Int(i32),
    /// UUID key component (error-type identifiers).
    Uuid(Uuid),
}

/// A column value stored in a row.
///
/// `Null` is an explicit "unset this column" marker: writing it removes the
/// column from the row, which is how a conditional clean empties a
/// date/checksum pair without touching the rest of the row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// UTF-8 text.
    Text(String),
    /// 64-bit signed integer (also the representation of counter columns).
    BigInt(i64),
    /// 32-bit signed integer.
    Int(i32),
    /// Timestamp with UTC timezone.
    Timestamp(DateTime<Utc>),
    /// UUID (harvest checksums, error-type identifiers).
    Uuid(Uuid),
    /// Small string-to-string map (notification additional info).
    Map(BTreeMap<String, String>),
    /// Explicitly unset the column.
    Null,
}

/// Addresses one partition of one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    /// The table the partition belongs to.
    pub table: &'static str,
    /// The partition key components, in schema order.
    pub key: Vec<KeyValue>,
}

impl Partition {
    /// Creates a partition address.
    #[must_use]
    pub fn new(table: &'static str, key: Vec<KeyValue>) -> Self {
        Self { table, key }
    }
}

/// Precondition for a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Write unconditionally (plain upsert; creates the row if absent).
    None,
    /// Write only if the row already exists. An absent row makes the write
    /// a no-op, never an error, and does not create the row.
    RowExists,
    /// Write only if every listed column is currently unset. Applies (and
    /// creates the row) when the row is absent.
    ColumnsUnset(&'static [&'static str]),
}

/// Result of a conditional write.
///
/// `NotApplied` is a normal, silently-accepted outcome; treating it as a
/// failure is a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write took effect.
    Applied,
    /// The precondition did not hold; nothing changed.
    NotApplied,
}

impl WriteOutcome {
    /// Returns true if the write took effect.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// One row write within a partition: clustering key, the columns to set,
/// and the precondition under which to set them.
///
/// Only the listed columns are touched; all others keep their values. This
/// is what lets independent pipeline stages update different columns of the
/// same logical record concurrently without a prior read.
#[derive(Debug, Clone)]
pub struct RowWrite {
    /// Clustering key of the target row.
    pub clustering: Vec<KeyValue>,
    /// Columns to set (or unset, for [`ColumnValue::Null`]).
    pub columns: Vec<(&'static str, ColumnValue)>,
    /// Precondition for the write.
    pub precondition: Precondition,
}

impl RowWrite {
    /// Creates an unconditional upsert for the given clustering key.
    #[must_use]
    pub fn upsert(clustering: Vec<KeyValue>) -> Self {
        Self {
            clustering,
            columns: Vec::new(),
            precondition: Precondition::None,
        }
    }

    /// Adds a column to the write.
    #[must_use]
    pub fn set(mut self, column: &'static str, value: ColumnValue) -> Self {
        self.columns.push((column, value));
        self
    }

    /// Sets the precondition for the write.
    #[must_use]
    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }
}

/// A row returned from a read or scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The clustering key of the row.
    pub clustering: Vec<KeyValue>,
    /// The set columns of the row. Unset columns are simply absent.
    pub columns: HashMap<&'static str, ColumnValue>,
}

impl Row {
    /// Returns a text column, if set and of text type.
    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(ColumnValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns a 64-bit integer column, if set.
    #[must_use]
    pub fn bigint(&self, column: &str) -> Option<i64> {
        match self.columns.get(column) {
            Some(ColumnValue::BigInt(n)) => Some(*n),
            _ => None,
        }
    }

    /// Returns a 32-bit integer column, if set.
    #[must_use]
    pub fn int(&self, column: &str) -> Option<i32> {
        match self.columns.get(column) {
            Some(ColumnValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Returns a timestamp column, if set.
    #[must_use]
    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.columns.get(column) {
            Some(ColumnValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    /// Returns a UUID column, if set.
    #[must_use]
    pub fn uuid(&self, column: &str) -> Option<Uuid> {
        match self.columns.get(column) {
            Some(ColumnValue::Uuid(u)) => Some(*u),
            _ => None,
        }
    }

    /// Returns a map column, if set.
    #[must_use]
    pub fn map(&self, column: &str) -> Option<&BTreeMap<String, String>> {
        match self.columns.get(column) {
            Some(ColumnValue::Map(m)) => Some(m),
            _ => None,
        }
    }
}

/// Inclusive clustering-key range for a partition scan.
#[derive(Debug, Clone, Default)]
pub struct ScanRange {
    /// Inclusive lower bound, or unbounded.
    pub from: Option<Vec<KeyValue>>,
    /// Inclusive upper bound, or unbounded.
    pub to: Option<Vec<KeyValue>>,
}

impl ScanRange {
    /// The unbounded range: every row in the partition.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// An inclusive `[from, to]` range.
    #[must_use]
    pub fn between(from: Vec<KeyValue>, to: Vec<KeyValue>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Scan direction over the clustering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Ascending clustering-key order.
    Asc,
    /// Descending clustering-key order.
    Desc,
}

/// The partitioned column-store contract all tracking stores are built on.
///
/// Implementations apply their configured [`Consistency`] to every
/// operation. All methods are safe for concurrent use from many callers;
/// within one partition, conflicting writes to the same row serialize with
/// last-writer-wins column semantics.
#[async_trait]
pub trait PartitionStore: Send + Sync + 'static {
    /// Reads one row by its full key.
    ///
    /// Returns `None` if the row does not exist.
    async fn read(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<Option<Row>>;

    /// Applies one (possibly conditional) row write.
    ///
    /// A failed precondition is reported as [`WriteOutcome::NotApplied`],
    /// never as an error.
    async fn write(&self, partition: &Partition, write: RowWrite) -> Result<WriteOutcome>;

    /// Applies many row writes to one partition as a single unlogged batch.
    ///
    /// An empty batch is a defensive no-op. Batches never span partitions:
    /// mixing partitions would degrade to the cost of unbatched writes, so
    /// the contract forbids it outright.
    async fn write_batch(&self, partition: &Partition, writes: Vec<RowWrite>) -> Result<()>;

    /// Scans rows of one partition within an inclusive clustering range,
    /// ordered by clustering key.
    async fn scan(
        &self,
        partition: &Partition,
        range: ScanRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Row>>;

    /// Deletes one row. Succeeds even if the row does not exist.
    async fn delete_row(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<()>;

    /// Deletes every row of one partition.
    async fn delete_partition(&self, partition: &Partition) -> Result<()>;

    /// Adds `delta` to a counter column, creating the row at zero first if
    /// it does not exist.
    async fn increment(
        &self,
        partition: &Partition,
        clustering: &[KeyValue],
        column: &'static str,
        delta: i64,
    ) -> Result<()>;
}
