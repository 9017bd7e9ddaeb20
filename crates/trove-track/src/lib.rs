//! # trove-track
//!
//! Progress tracking for record-processing pipelines over a partitioned
//! column store.
//!
//! Components:
//!
//! - **Processed records**: per-task, per-record status with hash-bucketed
//!   partitions and partial-column updates
//! - **Harvested records**: per-dataset harvest/index metadata with
//!   conditional clean and complete-if-empty writes
//! - **Batch coalescer and updaters**: bulk maintenance batched per bucket
//! - **Notification log**: append-only, sequence-bucketed per-task log
//! - **Error aggregator**: per-type counters plus bounded samples
//! - **Task state index and task info**: authoritative task rows plus an
//!   application-maintained by-state index
//!
//! All components take an `Arc` of a [`trove_core::PartitionStore`]
//! implementation; wrap the backend in a
//! [`trove_core::RetryingStore`] once at startup and share it.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trove_core::prelude::*;
//! use trove_track::{NotificationLog, ProcessedRecordStore};
//!
//! # async fn demo() -> trove_core::Result<()> {
//! let backend = Arc::new(MemoryStore::new());
//! let store = Arc::new(RetryingStore::new(backend, RetryConfig::default()));
//!
//! let records = ProcessedRecordStore::new(store.clone());
//! let notifications = NotificationLog::new(store);
//! let count = notifications.count_processed(1).await?;
//! assert_eq!(count, 0);
//! let _ = records;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod coalescer;
pub mod config;
pub mod errors;
pub mod harvested;
pub mod metrics;
pub mod notifications;
pub mod processed;
pub mod schema;
pub mod task_info;
pub mod task_state;
pub mod updaters;

pub use coalescer::{BatchCoalescer, WritePlanner, BATCH_SIZE};
pub use config::TrackConfig;
pub use errors::{error_type_id, ErrorAggregator, ErrorSample, ErrorTypeCount};
pub use harvested::{DatasetScan, HarvestedRecord, HarvestedRecordStore, IndexTarget};
pub use notifications::{Notification, NotificationLog};
pub use processed::{ProcessedRecord, ProcessedRecordStore, RecordState};
pub use task_info::{RecordCounters, TaskInfo, TaskInfoStore};
pub use task_state::{TaskByState, TaskState, TaskStateIndex};
pub use updaters::{CleanUpdater, CompleteUpdater};
