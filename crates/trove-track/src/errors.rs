//! Per-task error aggregation.
//!
//! Errors are grouped by a type identifier derived from the error message,
//! with a counter row per type and concrete sample occurrences per type,
//! clustered by the resource they occurred on. The counter answers "how
//! many", the samples answer "show me one", and neither requires scanning
//! raw notifications.
//!
//! Sampling is bounded by the callers: a reporter that already holds
//! enough examples (via [`ErrorAggregator::count_for_type`]) stops calling
//! [`ErrorAggregator::record_sample`]. The store itself never caps, and
//! never reads before writing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use trove_core::error::Result;
use trove_core::store::{
    ColumnValue, KeyValue, Partition, PartitionStore, Row, RowWrite, ScanOrder, ScanRange,
};

use crate::metrics;
use crate::schema::{error_counters, error_notifications};

/// Maps an error message to its stable type identifier.
///
/// The identifier is deterministic: the same message always yields the
/// same UUID, so occurrences of one failure mode land on one counter row
/// across processes and restarts.
#[must_use]
pub fn error_type_id(message: &str) -> Uuid {
    let digest = Sha256::digest(message.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Aggregated view of one error type within one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTypeCount {
    /// Error-type identifier.
    pub error_type: Uuid,
    /// Number of recorded occurrences.
    pub count: i64,
}

/// One stored sample occurrence of an error type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSample {
    /// Error-type identifier.
    pub error_type: Uuid,
    /// Resource the error occurred on. One sample per resource per type.
    pub resource: String,
    /// The full error message.
    pub error_message: String,
    /// Additional free-form info.
    pub additional_informations: Option<String>,
}

/// Per-task error counters and samples.
#[derive(Debug)]
pub struct ErrorAggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for ErrorAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: PartitionStore> ErrorAggregator<S> {
    /// Creates the aggregator over a shared backend.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn counter_partition(task_id: i64) -> Partition {
        Partition::new(error_counters::TABLE, vec![KeyValue::BigInt(task_id)])
    }

    fn sample_partition(task_id: i64, error_type: Uuid) -> Partition {
        Partition::new(
            error_notifications::TABLE,
            vec![KeyValue::BigInt(task_id), KeyValue::Uuid(error_type)],
        )
    }

    /// Records one error occurrence: bumps the type counter and stores the
    /// occurrence as a sample under its resource.
    ///
    /// Returns the error-type identifier the occurrence was filed under.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn report(
        &self,
        task_id: i64,
        message: &str,
        resource: &str,
        additional_informations: Option<&str>,
    ) -> Result<Uuid> {
        let error_type = error_type_id(message);
        self.increment_counter(task_id, error_type).await?;
        self.record_sample(task_id, error_type, message, resource, additional_informations)
            .await?;
        metrics::record_error_reported();
        Ok(error_type)
    }

    /// Bumps one error type's occurrence counter by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn increment_counter(&self, task_id: i64, error_type: Uuid) -> Result<()> {
        self.store
            .increment(
                &Self::counter_partition(task_id),
                &[KeyValue::Uuid(error_type)],
                error_counters::COUNTER,
                1,
            )
            .await
    }

    /// Stores one occurrence as a sample, clustered by its resource.
    ///
    /// A single unconditional upsert: concurrent reporters never collide,
    /// and re-reporting the same resource replaces its sample rather than
    /// growing the partition. Callers that already hold enough samples for
    /// the type simply stop calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn record_sample(
        &self,
        task_id: i64,
        error_type: Uuid,
        message: &str,
        resource: &str,
        additional_informations: Option<&str>,
    ) -> Result<()> {
        let mut write = RowWrite::upsert(vec![KeyValue::Text(resource.to_string())]).set(
            error_notifications::ERROR_MESSAGE,
            ColumnValue::Text(message.to_string()),
        );
        if let Some(extra) = additional_informations {
            write = write.set(
                error_notifications::ADDITIONAL_INFORMATIONS,
                ColumnValue::Text(extra.to_string()),
            );
        }
        self.store
            .write(&Self::sample_partition(task_id, error_type), write)
            .await?;
        Ok(())
    }

    /// The total number of error occurrences across all types of a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn total_errors(&self, task_id: i64) -> Result<i64> {
        let rows = self
            .store
            .scan(
                &Self::counter_partition(task_id),
                ScanRange::all(),
                ScanOrder::Asc,
                None,
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.bigint(error_counters::COUNTER))
            .sum())
    }

    /// The occurrence count of one error type, 0 if never seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn count_for_type(&self, task_id: i64, error_type: Uuid) -> Result<i64> {
        let row = self
            .store
            .read(
                &Self::counter_partition(task_id),
                &[KeyValue::Uuid(error_type)],
            )
            .await?;
        Ok(row
            .and_then(|row| row.bigint(error_counters::COUNTER))
            .unwrap_or(0))
    }

    /// All error types of a task with their counts, in clustering order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn error_types(&self, task_id: i64) -> Result<Vec<ErrorTypeCount>> {
        let rows = self
            .store
            .scan(
                &Self::counter_partition(task_id),
                ScanRange::all(),
                ScanOrder::Asc,
                None,
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let error_type = match row.clustering.first() {
                    Some(KeyValue::Uuid(u)) => *u,
                    _ => return None,
                };
                Some(ErrorTypeCount {
                    error_type,
                    count: row.bigint(error_counters::COUNTER)?,
                })
            })
            .collect())
    }

    /// The message of one stored sample of an error type (the sample with
    /// the lowest resource in clustering order).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn sample_message(&self, task_id: i64, error_type: Uuid) -> Result<Option<String>> {
        let rows = self
            .store
            .scan(
                &Self::sample_partition(task_id, error_type),
                ScanRange::all(),
                ScanOrder::Asc,
                Some(1),
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.text(error_notifications::ERROR_MESSAGE))
            .map(str::to_string))
    }

    /// All stored samples of an error type, in resource order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn samples(&self, task_id: i64, error_type: Uuid) -> Result<Vec<ErrorSample>> {
        let rows = self
            .store
            .scan(
                &Self::sample_partition(task_id, error_type),
                ScanRange::all(),
                ScanOrder::Asc,
                None,
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::sample_from_row(error_type, row))
            .collect())
    }

    /// Removes every counter and sample of a task.
    ///
    /// Sample partitions go first, counters last: an interrupted deletion
    /// leaves counters still pointing at their samples rather than orphaned
    /// samples no counter knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn delete_all(&self, task_id: i64) -> Result<()> {
        for entry in self.error_types(task_id).await? {
            self.store
                .delete_partition(&Self::sample_partition(task_id, entry.error_type))
                .await?;
        }
        self.store
            .delete_partition(&Self::counter_partition(task_id))
            .await
    }

    fn sample_from_row(error_type: Uuid, row: &Row) -> Option<ErrorSample> {
        let resource = match row.clustering.first() {
            Some(KeyValue::Text(r)) => r.clone(),
            _ => return None,
        };
        Some(ErrorSample {
            error_type,
            resource,
            error_message: row.text(error_notifications::ERROR_MESSAGE)?.to_string(),
            additional_informations: row
                .text(error_notifications::ADDITIONAL_INFORMATIONS)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_core::memory::MemoryStore;

    fn aggregator() -> ErrorAggregator<MemoryStore> {
        ErrorAggregator::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_error_type_id_is_deterministic() {
        let a = error_type_id("connection refused");
        let b = error_type_id("connection refused");
        let c = error_type_id("timeout");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_report_counts_and_samples() {
        let agg = aggregator();
        let error_type = agg
            .report(1, "parse failure", "resource-1", None)
            .await
            .expect("report");
        agg.report(1, "parse failure", "resource-2", Some("line 5"))
            .await
            .expect("report");

        assert_eq!(agg.count_for_type(1, error_type).await.expect("count"), 2);
        assert_eq!(agg.total_errors(1).await.expect("total"), 2);

        let samples = agg.samples(1, error_type).await.expect("samples");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].resource, "resource-1");
        assert_eq!(samples[1].resource, "resource-2");
        assert_eq!(samples[1].additional_informations.as_deref(), Some("line 5"));
    }

    #[tokio::test]
    async fn test_concurrent_reports_lose_no_samples() {
        let agg = aggregator();
        // Many workers reporting the same failure mode for different
        // resources at once. Every occurrence must land: one counter
        // bump and one sample row each, nothing overwritten.
        let mut handles = Vec::new();
        for i in 0..32 {
            let agg = agg.clone();
            handles.push(tokio::spawn(async move {
                agg.report(1, "same failure", &format!("resource-{i}"), None)
                    .await
            }));
        }
        let mut error_type = None;
        for handle in handles {
            error_type = Some(handle.await.expect("join").expect("report"));
        }
        let error_type = error_type.expect("at least one report");

        assert_eq!(agg.count_for_type(1, error_type).await.expect("count"), 32);
        assert_eq!(agg.samples(1, error_type).await.expect("samples").len(), 32);
    }

    #[tokio::test]
    async fn test_same_resource_replaces_its_sample() {
        let agg = aggregator();
        let error_type = agg.report(1, "oom", "r-1", None).await.expect("report");
        agg.report(1, "oom", "r-1", Some("second attempt"))
            .await
            .expect("report");

        // Counted twice, sampled once.
        assert_eq!(agg.count_for_type(1, error_type).await.expect("count"), 2);
        let samples = agg.samples(1, error_type).await.expect("samples");
        assert_eq!(samples.len(), 1);
        assert_eq!(
            samples[0].additional_informations.as_deref(),
            Some("second attempt")
        );
    }

    #[tokio::test]
    async fn test_total_sums_across_types() {
        let agg = aggregator();
        agg.report(1, "oom", "r-1", None).await.expect("report");
        agg.report(1, "oom", "r-2", None).await.expect("report");
        agg.report(1, "timeout", "r-3", None).await.expect("report");

        assert_eq!(agg.total_errors(1).await.expect("total"), 3);
        assert_eq!(agg.error_types(1).await.expect("types").len(), 2);
        // A different task is untouched.
        assert_eq!(agg.total_errors(2).await.expect("total"), 0);
    }

    #[tokio::test]
    async fn test_sample_message_returns_first_stored() {
        let agg = aggregator();
        let error_type = agg
            .report(1, "validation failed", "r-1", None)
            .await
            .expect("report");
        assert_eq!(
            agg.sample_message(1, error_type).await.expect("sample"),
            Some("validation failed".to_string())
        );
        assert_eq!(
            agg.sample_message(1, error_type_id("never-reported"))
                .await
                .expect("sample"),
            None
        );
    }

    #[tokio::test]
    async fn test_delete_all_clears_counters_and_samples() {
        let agg = aggregator();
        let error_type = agg.report(1, "oom", "r-1", None).await.expect("report");
        agg.report(1, "timeout", "r-2", None).await.expect("report");

        agg.delete_all(1).await.expect("delete");
        assert_eq!(agg.total_errors(1).await.expect("total"), 0);
        assert!(agg.samples(1, error_type).await.expect("samples").is_empty());
    }
}
