//! Block durations for successive failures.

use std::time::Duration;

use upguard_core::AutoBlockConfig;

/// Fibonacci sequence seeded at the configured floor: with a 40 second floor
/// it yields 40, 40, 80, 120, 200, ... seconds.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    floor: Duration,
    max: Option<Duration>,
    previous: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    pub fn new(config: AutoBlockConfig) -> Self {
        Self { floor: config.initial, max: config.max, previous: Duration::ZERO, current: config.initial }
    }

    /// Return the next block duration and advance the cursor.
    pub fn next_term(&mut self) -> Duration {
        let term = self.clamp(self.current);
        if self.max.is_none_or(|max| self.current < max) {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        term
    }

    /// Peek at the duration the next failure would block for.
    pub fn peek(&self) -> Duration {
        self.clamp(self.current)
    }

    /// Move the cursor back to the floor.
    pub fn reset(&mut self) {
        self.previous = Duration::ZERO;
        self.current = self.floor;
    }

    fn clamp(&self, term: Duration) -> Duration {
        match self.max {
            Some(max) => term.min(max),
            None => term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff, n: usize) -> Vec<u64> {
        (0..n).map(|_| backoff.next_term().as_secs()).collect()
    }

    #[test]
    fn test_default_sequence() {
        let mut backoff = FibonacciBackoff::new(AutoBlockConfig::default());
        assert_eq!(secs(&mut backoff, 6), vec![40, 40, 80, 120, 200, 320]);
    }

    #[test]
    fn test_reset_returns_to_floor() {
        let mut backoff = FibonacciBackoff::new(AutoBlockConfig::default());
        secs(&mut backoff, 4);
        backoff.reset();
        assert_eq!(backoff.peek(), Duration::from_secs(40));
        assert_eq!(secs(&mut backoff, 3), vec![40, 40, 80]);
    }

    #[test]
    fn test_max_caps_terms() {
        let config = AutoBlockConfig { initial: Duration::from_secs(40), max: Some(Duration::from_secs(100)) };
        let mut backoff = FibonacciBackoff::new(config);
        assert_eq!(secs(&mut backoff, 6), vec![40, 40, 80, 100, 100, 100]);
    }

    #[test]
    fn test_custom_unit() {
        let config = AutoBlockConfig { initial: Duration::from_millis(10), max: None };
        let mut backoff = FibonacciBackoff::new(config);
        let terms: Vec<u128> = (0..4).map(|_| backoff.next_term().as_millis()).collect();
        assert_eq!(terms, vec![10, 10, 20, 30]);
    }
}
