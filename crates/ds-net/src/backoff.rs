//! Exponential backoff with jitter (`delay = delay*2 + jitter`), shared by
//! the relay client's reconnect loop and the continuous publisher's retry
//! loop.

use std::time::Duration;

use rand::Rng;

pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, attempt: 0 }
    }

    /// The delay to wait before the next attempt, with up to 25% jitter
    /// added on top. Advances the internal attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(16);
        let exp = self.base.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
        let capped = exp.min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let jitter_bound = (capped.as_millis() as u64 / 4).max(1);
        let jitter_ms = rand::thread_rng().gen_range(0..jitter_bound);
        capped + Duration::from_millis(jitter_ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_then_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let first = backoff.next_delay();
        let second = backoff.next_delay();
        assert!(first >= Duration::from_millis(100));
        assert!(second >= first.min(Duration::from_millis(200)));
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_secs(1) + Duration::from_millis(250));
        }
    }

    #[test]
    fn reset_returns_to_base_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100) && delay < Duration::from_millis(150));
    }
}
