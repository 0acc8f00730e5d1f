#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use super::memory::MemoryBudget;
use super::transport::CloseReason;

const DEFAULT_CONNECT_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for a gateway session.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Ceiling for inbound text and binary messages, resolved on every connect
    pub memory_budget: MemoryBudget,
    /// Decides whether a close notification triggers a reconnect
    pub reconnect_policy: ReconnectPolicy,
    /// Maximum time the connect handshake may take
    pub connect_timeout: Duration,
    /// Backoff used by [`GatewaySession::connect_with_retry`](super::GatewaySession::connect_with_retry)
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_budget: MemoryBudget::default(),
            reconnect_policy: ReconnectPolicy::always(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_DURATION,
            retry: RetryConfig::default(),
        }
    }
}

/// Predicate consulted with the close reason after the transport closes.
#[derive(Clone)]
pub struct ReconnectPolicy {
    predicate: Arc<dyn Fn(&CloseReason) -> bool + Send + Sync>,
}

impl ReconnectPolicy {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&CloseReason) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Reconnect after every close.
    #[must_use]
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Never reconnect automatically.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    #[must_use]
    pub fn should_reconnect(&self, close: &CloseReason) -> bool {
        (self.predicate)(close)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectPolicy").finish_non_exhaustive()
    }
}

/// Backoff for caller-driven connect retries.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of connect attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<RetryConfig> for ExponentialBackoff {
    fn from(config: RetryConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn retry_config_shapes_backoff() {
        let mut retry = RetryConfig::default();
        retry.initial_backoff = Duration::from_millis(250);
        retry.max_backoff = Duration::from_secs(4);
        retry.backoff_multiplier = 3.0;

        let mut backoff: ExponentialBackoff = retry.into();

        assert_eq!(backoff.initial_interval, Duration::from_millis(250));
        assert_eq!(backoff.max_interval, Duration::from_secs(4));
        assert!(
            backoff.max_elapsed_time.is_none(),
            "attempts are bounded by max_attempts, not elapsed time"
        );

        let delays: Vec<_> = (0..8).filter_map(|_| backoff.next_backoff()).collect();
        assert_eq!(delays.len(), 8, "backoff never gives up on its own");
        // Jitter is at most 50% around an interval capped at max_backoff.
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(6)));
        assert!(delays[0] <= Duration::from_millis(375));
    }

    #[test]
    fn default_policy_always_reconnects() {
        let config = Config::default();

        assert!(
            config
                .reconnect_policy
                .should_reconnect(&CloseReason::abnormal())
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn custom_policy_sees_close_code() {
        let policy = ReconnectPolicy::new(|close| close.code != 4004);

        assert!(policy.should_reconnect(&CloseReason::abnormal()));
        assert!(!policy.should_reconnect(&CloseReason::new(4004, "authentication failed")));
        assert!(!ReconnectPolicy::never().should_reconnect(&CloseReason::abnormal()));
    }
}
