//! Uniform retry policy for store operations.
//!
//! [`RetryingStore`] is an explicit decorator implementing
//! [`PartitionStore`]: construct the underlying backend once at process
//! start, wrap it once, and hand the wrapped store to every component.
//! Call sites never see retry logic, and nothing global or reflective is
//! involved.
//!
//! Only the transient infrastructure class ([`Error::is_transient`]) is
//! retried; not-found conditions and caller mistakes propagate immediately.
//! On exhaustion the last cause is surfaced inside
//! [`Error::RetriesExhausted`] together with the operation name.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::{
    KeyValue, Partition, PartitionStore, Row, RowWrite, ScanOrder, ScanRange, WriteOutcome,
};

/// Environment variable overriding the configured attempt count.
pub const OVERRIDE_ATTEMPTS_ENV: &str = "TROVE_OVERRIDE_RETRY_ATTEMPTS";
/// Environment variable overriding the configured delay, in milliseconds.
pub const OVERRIDE_DELAY_MS_ENV: &str = "TROVE_OVERRIDE_RETRY_DELAY_MS";

/// Metric: individual retry attempts after a transient failure.
pub const RETRY_ATTEMPTS_METRIC: &str = "trove_retry_attempts_total";
/// Metric: operations that failed on every attempt.
pub const RETRIES_EXHAUSTED_METRIC: &str = "trove_retries_exhausted_total";

const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_DELAY_MS: u64 = 5_000;

/// Retry policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Returns the delay as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Applies environment overrides, if set.
    ///
    /// `TROVE_OVERRIDE_RETRY_ATTEMPTS` and `TROVE_OVERRIDE_RETRY_DELAY_MS`
    /// take precedence over configured values; unparsable values are
    /// ignored. Deployments use these to shorten retries in tests.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(attempts) = env_u64(OVERRIDE_ATTEMPTS_ENV) {
            #[allow(clippy::cast_possible_truncation)]
            {
                self.max_attempts = attempts.min(u64::from(u32::MAX)) as u32;
            }
        }
        if let Some(delay) = env_u64(OVERRIDE_DELAY_MS_ENV) {
            self.delay_ms = delay;
        }
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Retry decorator over any [`PartitionStore`].
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use trove_core::memory::MemoryStore;
/// use trove_core::retry::{RetryConfig, RetryingStore};
///
/// let backend = Arc::new(MemoryStore::new());
/// let store = Arc::new(RetryingStore::new(backend, RetryConfig::default()));
/// // Pass `store` to every tracking component.
/// ```
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: Arc<S>,
    config: RetryConfig,
}

impl<S> RetryingStore<S> {
    /// Creates a retry decorator around a backend.
    #[must_use]
    pub fn new(inner: Arc<S>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn config(&self) -> RetryConfig {
        self.config
    }
}

impl<S: PartitionStore> RetryingStore<S> {
    async fn run<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut remaining = max_attempts;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    remaining -= 1;
                    if remaining == 0 {
                        metrics::counter!(RETRIES_EXHAUSTED_METRIC).increment(1);
                        return Err(Error::RetriesExhausted {
                            operation,
                            attempts: max_attempts,
                            source: Box::new(err),
                        });
                    }
                    metrics::counter!(RETRY_ATTEMPTS_METRIC).increment(1);
                    warn!(
                        operation,
                        error = %err,
                        retries_left = remaining,
                        "store operation failed, retrying after delay"
                    );
                    tokio::time::sleep(self.config.delay()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<S: PartitionStore> PartitionStore for RetryingStore<S> {
    async fn read(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<Option<Row>> {
        self.run("read", || self.inner.read(partition, clustering))
            .await
    }

    async fn write(&self, partition: &Partition, write: RowWrite) -> Result<WriteOutcome> {
        self.run("write", || self.inner.write(partition, write.clone()))
            .await
    }

    async fn write_batch(&self, partition: &Partition, writes: Vec<RowWrite>) -> Result<()> {
        self.run("write_batch", || {
            self.inner.write_batch(partition, writes.clone())
        })
        .await
    }

    async fn scan(
        &self,
        partition: &Partition,
        range: ScanRange,
        order: ScanOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        self.run("scan", || {
            self.inner.scan(partition, range.clone(), order, limit)
        })
        .await
    }

    async fn delete_row(&self, partition: &Partition, clustering: &[KeyValue]) -> Result<()> {
        self.run("delete_row", || self.inner.delete_row(partition, clustering))
            .await
    }

    async fn delete_partition(&self, partition: &Partition) -> Result<()> {
        self.run("delete_partition", || self.inner.delete_partition(partition))
            .await
    }

    async fn increment(
        &self,
        partition: &Partition,
        clustering: &[KeyValue],
        column: &'static str,
        delta: i64,
    ) -> Result<()> {
        self.run("increment", || {
            self.inner.increment(partition, clustering, column, delta)
        })
        .await
    }
}
