//! # trove-core
//!
//! Core abstractions for the trove progress-tracking store.
//!
//! This crate provides the foundational types and traits shared by the
//! tracking components:
//!
//! - **Partitioned Store Contract**: two-part keys, partial upserts,
//!   single-partition conditional writes, ordered range scans
//! - **Bucket Assignment**: deterministic hash and sequence bucketing
//! - **Retry Decorator**: a uniform bounded-retry policy over any backend
//! - **Error Types**: shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `trove-core` is the only crate allowed to define shared primitives.
//! Domain stores (processed records, harvested records, notifications,
//! errors, task state) live in `trove-track` and interact with storage
//! exclusively through the [`store::PartitionStore`] trait.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trove_core::prelude::*;
//!
//! // One backend, wrapped once in the retry decorator at process start.
//! let backend = Arc::new(MemoryStore::new());
//! let store = Arc::new(RetryingStore::new(backend, RetryConfig::default()));
//!
//! // Bucket assignment is a pure shared utility.
//! assert_eq!(hash_bucket("record-1", 64), hash_bucket("record-1", 64));
//! let _ = store;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod error;
pub mod memory;
pub mod observability;
pub mod retry;
pub mod store;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use trove_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bucket::{hash_bucket, sequence_bucket};
    pub use crate::error::{Error, Result};
    pub use crate::memory::MemoryStore;
    pub use crate::retry::{RetryConfig, RetryingStore};
    pub use crate::store::{
        ColumnValue, Consistency, KeyValue, Partition, PartitionStore, Precondition, Row, RowWrite,
        ScanOrder, ScanRange, WriteOutcome,
    };
}

// Re-export key types at crate root for ergonomics
pub use bucket::{hash_bucket, sequence_bucket};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use observability::{init_logging, LogFormat};
pub use retry::{RetryConfig, RetryingStore};
pub use store::{
    ColumnValue, Consistency, KeyValue, Partition, PartitionStore, Precondition, Row, RowWrite,
    ScanOrder, ScanRange, WriteOutcome,
};
