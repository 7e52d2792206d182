//! Timing configuration for a single task.
//!
//! Tasks hand the dispatcher a [`TaskConfig`] when they start. It goes
//! through [`TaskConfig::validated`] first, which clamps values that
//! would make a task spin (a repeat interval below
//! [`TaskConfig::MIN_REPEAT_INTERVAL`], a repeat cap of zero) and logs a
//! warning for each one instead of refusing the task.

use std::time::Duration;

use tracing::warn;

/// When a task runs and for how long.
///
/// | Field             | `None` / zero means            |
/// |-------------------|--------------------------------|
/// | `start_delay`     | run immediately                |
/// | `repeat_interval` | run the body once              |
/// | `max_repeats`     | repeat until stopped           |
/// | `timeout`         | no deadline                    |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskConfig {
    /// Wait before the first execution.
    pub start_delay: Duration,
    /// Gap between iterations of a repeating task.
    pub repeat_interval: Option<Duration>,
    /// Iteration cap for a repeating task.
    pub max_repeats: Option<u32>,
    /// Deadline for the whole lifecycle, measured from start.
    pub timeout: Option<Duration>,
}

impl TaskConfig {
    /// Smallest interval a repeating task may use.
    pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(10);

    /// A one-shot task that fires after `delay`.
    pub fn once_after(delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Self::default()
        }
    }

    /// A task that repeats every `interval` until stopped.
    pub fn repeating(interval: Duration) -> Self {
        Self {
            repeat_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_max_repeats(mut self, max: u32) -> Self {
        self.max_repeats = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat_interval.is_some()
    }

    /// Returns a copy with values clamped to safe ranges.
    ///
    /// Called by the dispatcher before every start. Rules:
    /// - `repeat_interval` is raised to [`Self::MIN_REPEAT_INTERVAL`].
    /// - `max_repeats` of 0 becomes 1; a repeating task always runs once.
    pub fn validated(mut self) -> Self {
        match self.repeat_interval {
            Some(interval) if interval < Self::MIN_REPEAT_INTERVAL => {
                warn!(
                    interval_ms = interval.as_millis() as u64,
                    min_ms = Self::MIN_REPEAT_INTERVAL.as_millis() as u64,
                    "repeat_interval below minimum, clamping"
                );
                self.repeat_interval = Some(Self::MIN_REPEAT_INTERVAL);
            }
            _ => {}
        }
        if self.max_repeats == Some(0) {
            warn!("max_repeats of 0, running once");
            self.max_repeats = Some(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runs_once_immediately() {
        let cfg = TaskConfig::default();
        assert_eq!(cfg.start_delay, Duration::ZERO);
        assert!(!cfg.is_repeating());
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn test_builders_compose() {
        let cfg = TaskConfig::repeating(Duration::from_secs(1))
            .with_start_delay(Duration::from_secs(2))
            .with_max_repeats(3)
            .with_timeout(Duration::from_secs(10));

        assert_eq!(cfg.repeat_interval, Some(Duration::from_secs(1)));
        assert_eq!(cfg.start_delay, Duration::from_secs(2));
        assert_eq!(cfg.max_repeats, Some(3));
        assert_eq!(cfg.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validated_clamps_tiny_interval_and_zero_repeats() {
        let cfg = TaskConfig::repeating(Duration::ZERO)
            .with_max_repeats(0)
            .validated();
        assert_eq!(cfg.repeat_interval, Some(TaskConfig::MIN_REPEAT_INTERVAL));
        assert_eq!(cfg.max_repeats, Some(1));
    }
}
