/// Exponential backoff for sandbox provisioning retries.
///
/// The executor itself never retries: a failed provisioning is returned
/// to the caller. Callers that want to retry (the runner binary does)
/// use this to space attempts out. The delay doubles after each failure,
/// capped at `max_delay`, with optional random jitter so several runners
/// sharing a provider account do not retry in lockstep.
use std::time::Duration;

use rand::Rng;

pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
    /// Upper bound of the random fraction added to each delay (0.0–1.0).
    jitter: f64,
    current_delay: Duration,
    /// Number of consecutive attempts (resets on `reset()`).
    pub attempt: u32,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter: 0.0,
            current_delay: initial_delay,
            attempt: 0,
        }
    }

    /// Adds up to `fraction` of the base delay at random to each delay.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Returns the current delay and advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_delay;
        self.attempt += 1;
        self.current_delay = (self.current_delay * self.multiplier).min(self.max_delay);

        if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            base + base.mul_f64(extra)
        } else {
            base
        }
    }

    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt = 0;
    }

    /// Returns true if the consecutive attempt count has reached `max`.
    pub fn exceeded_max_attempts(&self, max: u32) -> bool {
        self.attempt >= max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2);
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_max_delay_cap() {
        let mut b = Backoff::new(Duration::from_secs(4), Duration::from_secs(10), 2);
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(8));
        // 8 * 2 = 16, capped at 10
        assert_eq!(b.next_delay(), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 2)
            .with_jitter(0.5);
        for base in [2u64, 4, 8, 16] {
            let delay = b.next_delay();
            assert!(delay >= Duration::from_secs(base), "{delay:?} < {base}s");
            assert!(
                delay <= Duration::from_secs(base) + Duration::from_secs(base) / 2,
                "{delay:?} too large for {base}s"
            );
        }
    }

    #[test]
    fn test_jitter_is_clamped() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2)
            .with_jitter(5.0);
        assert!(b.next_delay() <= Duration::from_secs(2));

        let mut none = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2)
            .with_jitter(-1.0);
        assert_eq!(none.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_reset() {
        let mut b = Backoff::new(Duration::from_secs(2), Duration::from_secs(60), 2);
        b.next_delay();
        b.next_delay();
        assert_eq!(b.attempt, 2);

        b.reset();
        assert_eq!(b.attempt, 0);
        assert_eq!(b.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_exceeded_max_attempts() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2);
        assert!(!b.exceeded_max_attempts(2));
        b.next_delay();
        assert!(!b.exceeded_max_attempts(2));
        b.next_delay();
        assert!(b.exceeded_max_attempts(2));
    }
}
