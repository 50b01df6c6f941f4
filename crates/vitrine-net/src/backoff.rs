//! Capped exponential backoff for reconnect scheduling.

use std::time::Duration;

use rand::Rng;

// Beyond this the exponential term is far past any sane cap.
const MAX_SHIFT: u32 = 16;

/// Reconnect delay generator: exponential growth from `base` up to `cap`,
/// with equal jitter (half fixed, half uniform random) so clients that lost
/// the same server do not reconnect in lockstep.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Delay to sit out before the next connection attempt.
    ///
    /// The first call draws from `[base/2, base]`, doubling per call until
    /// the range reaches `[cap/2, cap]`.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(MAX_SHIFT);
        let exp_ms = (self.base.as_millis() as u64)
            .saturating_mul(1u64 << shift)
            .min(self.cap.as_millis() as u64);
        self.attempt = self.attempt.saturating_add(1);

        let half = exp_ms / 2;
        let jitter = rand::thread_rng().gen_range(0..=half);
        Duration::from_millis(half + jitter)
    }

    /// Forget progress after a successful open or a manual reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Connection attempts scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_is_within_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(50));
        assert!(delay <= Duration::from_millis(100));
    }

    #[test]
    fn test_delay_grows_toward_the_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        for _ in 0..10 {
            backoff.next_delay();
        }
        let late = backoff.next_delay();
        assert!(late >= Duration::from_secs(1));
        assert!(late <= Duration::from_secs(2));
    }

    #[test]
    fn test_cap_is_never_exceeded() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        for _ in 0..10 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }
}
