//! Configuration for synced collections.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration of one synced collection.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Server base URL (e.g., "https://app.example.com").
    pub base_url: String,
    /// Mount path of the resource (e.g., "/api/todos").
    pub resource_path: String,
    /// Identity column of the resource's rows.
    pub identity_column: String,
    /// Headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Request timeout; must exceed the server's live long-poll timeout.
    pub request_timeout: Duration,
    /// Number of confirmed `(transaction, row)` pairs remembered for
    /// responses that arrive after their feed event.
    pub observed_capacity: usize,
    /// Retry policy of the feed loop.
    pub retry: RetryConfig,
}

impl CollectionConfig {
    /// Creates a configuration for the resource mounted at `resource_path`.
    pub fn new(base_url: impl Into<String>, resource_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource_path: resource_path.into(),
            identity_column: "id".to_string(),
            headers: Vec::new(),
            request_timeout: Duration::from_secs(60),
            observed_capacity: 1024,
            retry: RetryConfig::default(),
        }
    }

    /// Returns the absolute URL of the resource.
    pub fn resource_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource_path.trim_start_matches('/')
        )
    }

    /// Sets the identity column.
    pub fn with_identity_column(mut self, column: impl Into<String>) -> Self {
        self.identity_column = column.into();
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the observed-transaction capacity.
    pub fn with_observed_capacity(mut self, capacity: usize) -> Self {
        self.observed_capacity = capacity.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Returns true if another attempt is allowed after `failures` consecutive failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }

    /// Calculates the delay before retry number `attempt` (1-based; 0 has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            Duration::from_secs_f64(delay_secs * (1.0 + 0.25 * jitter_fraction()))
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

// Clock-derived fraction in [0, 1).
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_config_builder() {
        let config = CollectionConfig::new("http://localhost:8080/", "/api/todos")
            .with_identity_column("todo_id")
            .with_header("x-user-id", "alice")
            .with_request_timeout(Duration::from_secs(5))
            .with_observed_capacity(0);

        assert_eq!(config.resource_url(), "http://localhost:8080/api/todos");
        assert_eq!(config.identity_column, "todo_id");
        assert_eq!(config.headers, vec![("x-user-id".to_string(), "alice".to_string())]);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.observed_capacity, 1);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert!(config.allows_retry(0));
        assert!(!config.allows_retry(1));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay3 = config.delay_for_attempt(3);
        assert!(delay3 >= Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .without_jitter();

        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(5));
    }
}
