use std::time::Duration;

/// Gate for a periodic job.
///
/// Accumulates elapsed time and fires once the period is reached. When the
/// caller falls more than a whole period behind, the backlog is dropped
/// instead of firing repeatedly to catch up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    period: Duration,
    elapsed: Duration,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            elapsed: Duration::ZERO,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Advance by `delta`. Returns true if the job is due.
    pub fn advance(&mut self, delta: Duration) -> bool {
        if self.period.is_zero() {
            return true;
        }
        self.elapsed += delta;
        if self.elapsed < self.period {
            return false;
        }
        self.elapsed -= self.period;
        if self.elapsed >= self.period {
            let behind = self.elapsed.as_nanos() % self.period.as_nanos();
            self.elapsed = Duration::from_nanos(behind as u64);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn fires_when_period_reached() {
        let mut interval = Interval::new(10 * MS);
        assert!(!interval.advance(4 * MS));
        assert!(!interval.advance(4 * MS));
        assert!(interval.advance(4 * MS));
        // 2ms carried over
        assert!(!interval.advance(7 * MS));
        assert!(interval.advance(MS));
    }

    #[test]
    fn zero_period_always_fires() {
        let mut interval = Interval::new(Duration::ZERO);
        assert!(interval.advance(Duration::ZERO));
        assert!(interval.advance(MS));
    }

    #[test]
    fn large_delta_fires_once_and_drops_backlog() {
        let mut interval = Interval::new(10 * MS);
        assert!(interval.advance(35 * MS));
        assert!(!interval.advance(4 * MS));
        assert!(interval.advance(MS));
    }
}
