//! Configuration for the tracking stores.

use serde::{Deserialize, Serialize};

use trove_core::retry::RetryConfig;
use trove_core::store::Consistency;

/// Configuration shared by every tracking store.
///
/// Deserialized from the application's config file; every field has a
/// default, so an empty section is valid.
///
/// ## Example
///
/// ```rust
/// let config: trove_track::TrackConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.retry.max_attempts, 8);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Retry policy applied to every store operation.
    pub retry: RetryConfig,
    /// Consistency level the backend applies to reads and writes.
    pub consistency: Consistency,
}

impl TrackConfig {
    /// Applies the retry environment overrides on top of the parsed
    /// configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.retry = self.retry.with_env_overrides();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TrackConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.delay_ms, 5000);
        assert_eq!(config.consistency, Consistency::Quorum);
    }

    #[test]
    fn test_partial_config_overrides_fields() {
        let config: TrackConfig = serde_json::from_str(
            r#"{"retry": {"max_attempts": 2}, "consistency": "local_quorum"}"#,
        )
        .expect("parse");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.delay_ms, 5000);
        assert_eq!(config.consistency, Consistency::LocalQuorum);
    }
}
