//! Processor configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for one [`crate::coordinator::Processor`].
///
/// Constructed once at startup and passed by reference into each component;
/// nothing in the crate reads configuration from the environment at
/// type-initialization time. There is deliberately no `Default`: every value,
/// in particular the polling interval, must be explicit at the construction
/// site.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Queue the processor receives from, one ordering key at a time.
    pub input_queue: String,

    /// Queue the `QueueMessage` step publishes processed results to.
    pub output_queue: String,

    /// Ordering key used for everything published to the output queue.
    pub output_ordering_key: String,

    /// Interval between run-status checks while a workflow is in flight.
    /// Must be non-zero.
    pub poll_interval: Duration,

    /// Upper bound on how long a single run may be polled before the
    /// delivery is abandoned with a timeout.
    pub max_poll_wait: Duration,

    /// Whether `HandleMessage` injects simulated intermittent failures.
    pub fault_injection: bool,

    /// Base duration `HandleMessage` sleeps to model real work; a bounded
    /// random jitter is added on top.
    pub simulated_processing_duration: Duration,
}

impl ProcessorConfig {
    /// Reject configurations the processor must not run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_interval(poll_interval: Duration) -> ProcessorConfig {
        ProcessorConfig {
            input_queue: "in".into(),
            output_queue: "out".into(),
            output_ordering_key: "single".into(),
            poll_interval,
            max_poll_wait: Duration::from_secs(5),
            fault_injection: false,
            simulated_processing_duration: Duration::ZERO,
        }
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let err = config_with_interval(Duration::ZERO).validate().unwrap_err();
        assert_eq!(err, ConfigError::ZeroPollInterval);
    }

    #[test]
    fn positive_poll_interval_accepted() {
        assert!(config_with_interval(Duration::from_millis(100)).validate().is_ok());
    }
}
