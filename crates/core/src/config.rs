//! Configuration types for the job queue.

use std::time::Duration;

use crate::error::{ConvoyError, Result};

/// Default time a completed item record survives: one day.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60 * 24);

/// Longest retention actually applied. Larger values are clamped so that
/// `now + retention` stays representable, and Redis still accepts the TTL.
pub const MAX_RETENTION: Duration = Duration::from_millis(i64::MAX as u64 / 2);

/// Retention in milliseconds, clamped to [`MAX_RETENTION`].
pub fn retention_millis(retention: Duration) -> i64 {
    i64::try_from(retention.min(MAX_RETENTION).as_millis()).unwrap_or(i64::MAX / 2)
}

/// Engine configuration, built once and handed to every [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ConvoyConfig {
    /// Backend connection URL.
    pub url: String,
    /// How long a completed item record survives before TTL eviction.
    pub retention: Duration,
}

impl Default for ConvoyConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl ConvoyConfig {
    /// Create a new ConvoyConfig with the default retention.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a new builder.
    pub fn builder() -> ConvoyConfigBuilder {
        ConvoyConfigBuilder::new()
    }

    /// The URL, or a configuration error if none was set.
    pub fn require_url(&self) -> Result<&str> {
        if self.url.is_empty() {
            return Err(ConvoyError::Config("backend url is required".to_string()));
        }
        Ok(&self.url)
    }
}

/// Builder for ConvoyConfig.
#[derive(Debug, Default)]
pub struct ConvoyConfigBuilder {
    config: ConvoyConfig,
}

impl ConvoyConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the retention of completed records.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.retention = retention;
        self
    }

    /// Build the ConvoyConfig.
    pub fn build(self) -> ConvoyConfig {
        self.config
    }
}

/// Configuration for a [`crate::Worker`] loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to take items from.
    pub queue: String,
    /// Pause after finding the queue empty.
    pub poll_interval: Duration,
    /// Pause after a backend error.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create a new builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::new()
    }
}

/// Builder for WorkerConfig.
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue name.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.config.queue = queue.into();
        self
    }

    /// Set the idle poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the backoff after backend errors.
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    /// Build the WorkerConfig.
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

/// Configuration for a [`crate::Sweeper`] loop.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Queue to sweep.
    pub queue: String,
    /// Time between sweeps.
    pub interval: Duration,
    /// Claims older than this are considered stuck.
    pub stuck_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            interval: Duration::from_secs(60),
            stuck_after: Duration::from_secs(300),
        }
    }
}

impl SweeperConfig {
    /// Create a new builder.
    pub fn builder() -> SweeperConfigBuilder {
        SweeperConfigBuilder::new()
    }
}

/// Builder for SweeperConfig.
#[derive(Debug, Default)]
pub struct SweeperConfigBuilder {
    config: SweeperConfig,
}

impl SweeperConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue name.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.config.queue = queue.into();
        self
    }

    /// Set the sweep interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the age after which a claim counts as stuck.
    pub fn stuck_after(mut self, age: Duration) -> Self {
        self.config.stuck_after = age;
        self
    }

    /// Build the SweeperConfig.
    pub fn build(self) -> SweeperConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convoy_config_default() {
        let config = ConvoyConfig::default();
        assert!(config.url.is_empty());
        assert_eq!(config.retention, Duration::from_secs(86400));
    }

    #[test]
    fn test_convoy_config_new_keeps_default_retention() {
        let config = ConvoyConfig::new("redis://localhost");
        assert_eq!(config.url, "redis://localhost");
        assert_eq!(config.retention, DEFAULT_RETENTION);
    }

    #[test]
    fn test_convoy_config_builder() {
        let config = ConvoyConfig::builder()
            .url("redis://cache:6379")
            .retention(Duration::from_secs(3600))
            .build();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.retention, Duration::from_secs(3600));
    }

    #[test]
    fn test_retention_millis_clamps_huge_values() {
        assert_eq!(retention_millis(Duration::ZERO), 0);
        assert_eq!(retention_millis(DEFAULT_RETENTION), 86_400_000);
        assert_eq!(retention_millis(Duration::from_secs(u64::MAX)), i64::MAX / 2);
        assert_eq!(retention_millis(Duration::from_millis(i64::MAX as u64)), i64::MAX / 2);
        assert!(crate::item::now_millis()
            .checked_add(retention_millis(Duration::MAX))
            .is_some());
    }

    #[test]
    fn test_require_url() {
        assert!(matches!(
            ConvoyConfig::default().require_url(),
            Err(ConvoyError::Config(_))
        ));
        assert_eq!(
            ConvoyConfig::new("redis://x").require_url().unwrap(),
            "redis://x"
        );
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::builder()
            .queue("orders")
            .poll_interval(Duration::from_millis(50))
            .error_backoff(Duration::from_millis(200))
            .build();
        assert_eq!(config.queue, "orders");
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.error_backoff, Duration::from_millis(200));
    }

    #[test]
    fn test_sweeper_config_default() {
        let config = SweeperConfig::default();
        assert_eq!(config.queue, "default");
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.stuck_after, Duration::from_secs(300));
    }

    #[test]
    fn test_sweeper_config_builder() {
        let config = SweeperConfig::builder()
            .queue("orders")
            .interval(Duration::from_secs(5))
            .stuck_after(Duration::from_secs(30))
            .build();
        assert_eq!(config.queue, "orders");
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.stuck_after, Duration::from_secs(30));
    }
}
