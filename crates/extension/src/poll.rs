//! Poll scheduling for change detection.

use std::time::Duration;

use pricewatch_core::AppConfig;

/// Interval policy for a polling loop.
///
/// After a cycle that saw a change the next delay is the base interval.
/// Idle cycles multiply the delay by `factor`, capped at `max`. A factor
/// of 1.0 is a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval, max: interval, factor: 1.0 }
    }

    /// Content agent page polling.
    pub fn content(config: &AppConfig) -> Self {
        Self::with_backoff(config.content_poll_interval(), config)
    }

    /// Popup peer discovery polling.
    pub fn popup(config: &AppConfig) -> Self {
        Self::with_backoff(config.popup_poll_interval(), config)
    }

    fn with_backoff(interval: Duration, config: &AppConfig) -> Self {
        Self { interval, max: config.poll_max_interval().max(interval), factor: config.poll_backoff_factor }
    }

    pub fn next_delay(&self, current: Duration, changed: bool) -> Duration {
        if changed || !self.factor.is_finite() || self.factor <= 1.0 {
            return self.interval;
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * self.factor)
            .unwrap_or(self.max)
            .clamp(self.interval, self.max)
    }
}
