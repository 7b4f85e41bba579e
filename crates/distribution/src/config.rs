//! Configuration for bucket distribution and balancing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed number of logical buckets the key space is split into.
pub const TOTAL_BUCKETS: usize = 1000;

/// Default cache size per node: one GiB.
pub const DEFAULT_CACHE_SIZE_PER_NODE: i64 = 1024 * 1024 * 1024;

/// Configuration for a [`crate::DistributionManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Number of buckets in every map.
    pub total_buckets: usize,

    /// A node is a balancing candidate only when its data exceeds the
    /// cluster average by more than this percentage.
    pub auto_balancing_threshold: u32,

    /// Maximum cache size of a single node, in bytes.
    pub cache_size_per_node: i64,

    /// Tolerance (percent) accepted around a balancing target.
    pub cushion_factor: u32,

    /// Below this percentage of `cache_size_per_node` a node is not worth
    /// weight balancing and joins fall back to shuffled distribution.
    pub weight_balance_threshold_percent: u32,

    /// Attempts made by key routing before giving up.
    pub select_retries: u32,

    /// Pause between routing attempts.
    #[serde(with = "duration_millis")]
    pub select_retry_delay: Duration,

    /// Upper bound for status waits; `None` waits forever.
    #[serde(with = "opt_duration_millis")]
    pub wait_timeout: Option<Duration>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            total_buckets: TOTAL_BUCKETS,
            auto_balancing_threshold: 60,
            cache_size_per_node: DEFAULT_CACHE_SIZE_PER_NODE,
            cushion_factor: 10,
            weight_balance_threshold_percent: 10,
            select_retries: 3,
            select_retry_delay: Duration::from_millis(10),
            wait_timeout: None,
        }
    }
}

impl DistributionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total_buckets(mut self, total: usize) -> Self {
        self.total_buckets = total;
        self
    }

    pub fn with_auto_balancing_threshold(mut self, percent: u32) -> Self {
        self.auto_balancing_threshold = percent;
        self
    }

    /// Non-positive sizes are ignored and the previous value is kept.
    pub fn with_cache_size_per_node(mut self, bytes: i64) -> Self {
        if bytes > 0 {
            self.cache_size_per_node = bytes;
        }
        self
    }

    pub fn with_cushion_factor(mut self, percent: u32) -> Self {
        self.cushion_factor = percent;
        self
    }

    pub fn with_weight_balance_threshold_percent(mut self, percent: u32) -> Self {
        self.weight_balance_threshold_percent = percent;
        self
    }

    pub fn with_select_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.select_retries = retries;
        self.select_retry_delay = delay;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Weight below which a node does not need weight balancing.
    pub fn weight_balance_threshold(&self) -> i64 {
        self.cache_size_per_node * i64::from(self.weight_balance_threshold_percent) / 100
    }

    /// Check the configuration for values the algorithms cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.total_buckets == 0 {
            return Err(Error::Config("total_buckets must be positive".into()));
        }
        if self.total_buckets > i32::MAX as usize {
            return Err(Error::Config(format!(
                "total_buckets {} exceeds the hash code range",
                self.total_buckets
            )));
        }
        if self.cushion_factor > 100 {
            return Err(Error::Config(format!(
                "cushion_factor {} is not a percentage",
                self.cushion_factor
            )));
        }
        if self.weight_balance_threshold_percent > 100 {
            return Err(Error::Config(format!(
                "weight_balance_threshold_percent {} is not a percentage",
                self.weight_balance_threshold_percent
            )));
        }
        if self.select_retries == 0 {
            return Err(Error::Config("select_retries must be at least 1".into()));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DistributionConfig::default();
        assert_eq!(config.total_buckets, 1000);
        assert_eq!(config.cushion_factor, 10);
        assert_eq!(config.select_retries, 3);
        assert!(config.wait_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weight_balance_threshold_is_ten_percent_of_cache() {
        let config = DistributionConfig::new().with_cache_size_per_node(1_000_000);
        assert_eq!(config.weight_balance_threshold(), 100_000);
    }

    #[test]
    fn test_non_positive_cache_size_is_ignored() {
        let config = DistributionConfig::new().with_cache_size_per_node(0);
        assert_eq!(config.cache_size_per_node, DEFAULT_CACHE_SIZE_PER_NODE);
    }

    #[test]
    fn test_validate_rejects_zero_buckets() {
        let config = DistributionConfig::new().with_total_buckets(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_json_round_trip_keeps_timeouts() {
        let config = DistributionConfig::new()
            .with_wait_timeout(Some(Duration::from_millis(250)))
            .with_auto_balancing_threshold(25);
        let json = serde_json::to_string(&config).unwrap();
        let back: DistributionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DistributionConfig = serde_json::from_str(r#"{"total_buckets": 64}"#).unwrap();
        assert_eq!(config.total_buckets, 64);
        assert_eq!(config.cushion_factor, 10);
    }
}
