//! Progress throttling.
//!
//! Rate-limits how often a progress sink redraws. The aggregator already
//! drops regressions; this only keeps fast transfers from flooding a
//! terminal or UI with fractions nobody can see.

use std::time::{Duration, Instant};

/// Rate-limiter for progress redraws.
///
/// A fraction is let through when the configured interval has elapsed since
/// the last one, or when it completes the transfer (`>= 1.0`) so the final
/// state is never swallowed.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    /// Create a throttle with a default interval of 100ms.
    pub const fn default_interval() -> Self {
        Self::new(Duration::from_millis(100))
    }

    /// Whether `fraction` should be drawn now.
    pub fn should_emit(&mut self, fraction: f64) -> bool {
        let now = Instant::now();
        let due = self
            .last_emit
            .is_none_or(|last| now.duration_since(last) >= self.min_interval);

        if due || fraction >= 1.0 {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::default_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fraction_is_drawn() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        assert!(throttle.should_emit(0.1));
    }

    #[test]
    fn respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50));
        assert!(throttle.should_emit(0.1));
        assert!(!throttle.should_emit(0.2));

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit(0.3));
    }

    #[test]
    fn completion_bypasses_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60));
        assert!(throttle.should_emit(0.5));
        assert!(!throttle.should_emit(0.9));
        assert!(throttle.should_emit(1.0));
    }
}
