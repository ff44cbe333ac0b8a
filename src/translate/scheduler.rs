use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Serial pacing for outbound batches: one request in flight, and at least
/// `interval` between the end of one request and the start of the next.
#[derive(Debug)]
pub struct BatchScheduler {
    interval: Duration,
    last_completed: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_completed: None,
        }
    }

    /// Waits until the next request may be issued.
    pub async fn ready(&mut self) {
        if let Some(last) = self.last_completed {
            sleep_until(last + self.interval).await;
        }
    }

    /// Marks the in-flight request as finished, successful or not.
    pub fn complete(&mut self) {
        self.last_completed = Some(Instant::now());
    }
}
