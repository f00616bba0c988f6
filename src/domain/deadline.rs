use std::time::Duration;

use tokio::time::Instant;

/// Point in time by which a request (or one of its stages) must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Deadline(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Deadline(Instant::now() + budget)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time a sub-call may use: its own cap or whatever is left, whichever is smaller.
    pub fn budget(&self, cap: Duration) -> Duration {
        self.remaining().min(cap)
    }

    pub fn earliest(self, other: Deadline) -> Deadline {
        self.min(other)
    }

    /// Earlier deadline that keeps `reserve` free for later stages. Never takes
    /// more than half of the remaining time.
    pub fn reserve_up_to(&self, reserve: Duration) -> Deadline {
        let keep = reserve.min(self.remaining() / 2);
        Deadline(self.0 - keep)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Deadline;

    #[tokio::test(start_paused = true)]
    async fn budget_is_capped_by_remaining_time() {
        let deadline = Deadline::after(Duration::from_secs(2));

        assert_eq!(deadline.budget(Duration::from_secs(10)), Duration::from_secs(2));
        assert_eq!(
            deadline.budget(Duration::from_millis(500)),
            Duration::from_millis(500)
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.budget(Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reserve_keeps_at_least_half_the_budget() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let scrape = deadline.reserve_up_to(Duration::from_secs(3));
        assert_eq!(scrape.remaining(), Duration::from_secs(7));

        let short = Deadline::after(Duration::from_secs(2));
        let scrape = short.reserve_up_to(Duration::from_secs(3));
        assert_eq!(scrape.remaining(), Duration::from_secs(1));
    }
}
