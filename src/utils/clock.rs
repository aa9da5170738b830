use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of time for the whole application. Every module that needs "now",
/// a deadline, or a delay goes through this trait so tests can substitute a
/// deterministic clock.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    /// Current wall-clock time. Bucketing converts this to local time at the
    /// point of aggregation.
    fn time(&self) -> DateTime<Utc>;

    /// Monotonic reference point, used for heartbeat scheduling.
    fn instant(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    async fn sleep_until(&self, instant: Instant);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
