//! Delay computation between upload cycles.

use std::time::Duration;

use rand::Rng;

use crate::config::UploadConfig;

/// Exponent cap so the multiplier cannot overflow to infinity.
const MAX_EXPONENT: u32 = 32;

/// Decides how long to wait before the next cycle.
///
/// A successful cycle waits the regular interval, and so does the first
/// failure of any kind. Each further consecutive retryable failure grows the
/// delay by `multiplier` up to `max_delay`, while repeated permanent failures
/// wait `max_delay` outright. Jitter only removes time from the part above
/// the interval, so a delay never drops below the interval nor exceeds the cap.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    interval: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(interval: Duration, multiplier: f64, max_delay: Duration, jitter_ratio: f64) -> Self {
        Self {
            interval,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(interval),
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.interval(),
            config.backoff_multiplier,
            config.max_backoff(),
            config.jitter_ratio,
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn success_delay(&self) -> Duration {
        self.interval
    }

    /// Delay after a failed cycle, `consecutive_failures` including this one.
    pub fn failure_delay(&self, consecutive_failures: u32, retryable: bool) -> Duration {
        if consecutive_failures <= 1 {
            self.interval
        } else if retryable {
            self.retry_delay(consecutive_failures)
        } else {
            self.max_delay
        }
    }

    /// Delay before retrying after `consecutive_failures` failures, without jitter.
    pub fn base_retry_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures <= 1 {
            return self.interval;
        }

        let exponent = (consecutive_failures - 1).min(MAX_EXPONENT) as i32;
        let millis = self.interval.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retrying after `consecutive_failures` failures.
    pub fn retry_delay(&self, consecutive_failures: u32) -> Duration {
        let base = self.base_retry_delay(consecutive_failures);
        let headroom = base.saturating_sub(self.interval);
        let span = (headroom.as_millis() as f64 * self.jitter_ratio) as u64;
        if span == 0 {
            return base;
        }

        let jitter = rand::thread_rng().gen_range(0..=span);
        base.saturating_sub(Duration::from_millis(jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_ratio: f64) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(60),
            2.0,
            Duration::from_secs(600),
            jitter_ratio,
        )
    }

    #[test]
    fn test_first_failure_uses_interval() {
        let policy = policy(0.5);
        assert_eq!(policy.retry_delay(0), Duration::from_secs(60));
        assert_eq!(policy.retry_delay(1), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_grows_exponentially_until_cap() {
        let policy = policy(0.0);
        assert_eq!(policy.retry_delay(2), Duration::from_secs(120));
        assert_eq!(policy.retry_delay(3), Duration::from_secs(240));
        assert_eq!(policy.retry_delay(4), Duration::from_secs(480));
        assert_eq!(policy.retry_delay(5), Duration::from_secs(600));
        assert_eq!(policy.retry_delay(50), Duration::from_secs(600));
        assert_eq!(policy.retry_delay(u32::MAX), Duration::from_secs(600));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = policy(0.25);
        for failures in 2..10 {
            let base = policy.base_retry_delay(failures);
            let floor = base - (base - policy.interval()).mul_f64(0.25);
            for _ in 0..50 {
                let delay = policy.retry_delay(failures);
                assert!(delay <= base, "{delay:?} above {base:?}");
                assert!(delay >= floor, "{delay:?} below {floor:?}");
                assert!(delay >= policy.interval());
            }
        }
    }

    #[test]
    fn test_success_and_permanent_delays() {
        let policy = policy(0.1);
        assert_eq!(policy.success_delay(), Duration::from_secs(60));
        assert_eq!(policy.failure_delay(2, false), Duration::from_secs(600));
        assert_eq!(policy.failure_delay(7, false), Duration::from_secs(600));
    }

    #[test]
    fn test_first_failure_of_any_kind_uses_interval() {
        let policy = policy(0.5);
        assert_eq!(policy.failure_delay(1, true), Duration::from_secs(60));
        assert_eq!(policy.failure_delay(1, false), Duration::from_secs(60));
        assert_eq!(policy.failure_delay(0, false), Duration::from_secs(60));
    }

    #[test]
    fn test_constructor_normalizes_inputs() {
        let policy = BackoffPolicy::new(Duration::from_secs(60), 0.5, Duration::from_secs(10), 3.0);
        assert_eq!(policy.max_delay(), Duration::from_secs(60));
        // Multiplier below 1.0 would shrink delays
        assert_eq!(policy.retry_delay(3), Duration::from_secs(60));
    }

    #[test]
    fn test_from_default_config() {
        let policy = BackoffPolicy::from_config(&UploadConfig::default());
        assert_eq!(policy.success_delay(), Duration::from_millis(900_000));
        assert_eq!(policy.retry_delay(1), Duration::from_millis(900_000));
        assert_eq!(policy.failure_delay(1, false), Duration::from_millis(900_000));
        assert_eq!(policy.failure_delay(2, false), Duration::from_millis(3_600_000));
    }
}
