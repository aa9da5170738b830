use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::host::storage::close_out::CloseOutRecord;

use super::target::TabTarget;

/// Knobs of the attribution model. Defaults match the common deployment: a
/// 1 second minimum, no per-close-out cap, a 30 second heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Sessions shorter than this are discarded at close-out.
    pub min_session: Duration,
    /// Upper bound on a single close-out. Bounds the damage of a close-out
    /// the host never saw, e.g. around machine sleep.
    pub max_close_out: Option<Duration>,
    /// How often the active session is flushed and reopened.
    pub heartbeat: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_session: Duration::from_secs(1),
            max_close_out: None,
            heartbeat: Duration::from_secs(30),
        }
    }
}

/// The one active attribution, in memory only.
#[derive(Debug, Clone)]
struct Session {
    domain: Arc<str>,
    started_at: DateTime<Utc>,
    favicon: Option<Arc<str>>,
}

/// The attribution state machine: either idle or tracking exactly one
/// domain. Transitions return the close-out record they produced, if any;
/// the caller forwards those to the aggregator.
pub struct SessionTracker {
    config: TrackerConfig,
    session: Option<Session>,
}

impl SessionTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn current_domain(&self) -> Option<&Arc<str>> {
        self.session.as_ref().map(|s| &s.domain)
    }

    /// The domain whose session is still missing a favicon, if any.
    pub fn favicon_needed(&self) -> Option<Arc<str>> {
        self.session
            .as_ref()
            .filter(|s| s.favicon.is_none())
            .map(|s| s.domain.clone())
    }

    /// Moves attribution to `target`. A changed domain closes the running
    /// session and opens a new one; an untracked target just closes. Staying
    /// on the same domain keeps the session running.
    pub fn switch_to(&mut self, target: TabTarget, now: DateTime<Utc>) -> Option<CloseOutRecord> {
        match target {
            TabTarget::Tracked { domain, favicon } => {
                if let Some(session) = self.session.as_mut() {
                    if session.domain == domain {
                        if favicon.is_some() {
                            session.favicon = favicon;
                        }
                        return None;
                    }
                }
                let record = self.close_out(now);
                self.session = Some(Session {
                    domain,
                    started_at: now,
                    favicon,
                });
                record
            }
            TabTarget::Untracked => self.close_out(now),
        }
    }

    /// Ends attribution entirely: tab closed, focus lost, idle, suspend.
    pub fn close_out(&mut self, now: DateTime<Utc>) -> Option<CloseOutRecord> {
        let session = self.session.take()?;
        self.finish(session, now)
    }

    /// Heartbeat flush: closes out and immediately reopens the same domain,
    /// so an unclean shutdown loses at most one heartbeat of attribution.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<CloseOutRecord> {
        let session = self.session.take()?;
        self.session = Some(Session {
            domain: session.domain.clone(),
            started_at: now,
            favicon: session.favicon.clone(),
        });
        self.finish(session, now)
    }

    /// Applies a favicon that resolved after the session opened. A result
    /// for a session that has since ended is dropped here, which is what
    /// makes stale resolver retries harmless.
    pub fn attach_favicon(&mut self, domain: &str, favicon: Arc<str>) {
        if favicon.is_empty() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            if &*session.domain == domain && session.favicon.is_none() {
                session.favicon = Some(favicon);
            }
        }
    }

    fn finish(&self, session: Session, now: DateTime<Utc>) -> Option<CloseOutRecord> {
        let mut elapsed = rounded_seconds(now - session.started_at);
        if let Some(cap) = self.config.max_close_out {
            elapsed = elapsed.min(cap.as_secs());
        }
        if elapsed < self.config.min_session.as_secs() {
            debug!(
                "Discarding {}s session on {}",
                elapsed, session.domain
            );
            return None;
        }
        Some(CloseOutRecord {
            domain: session.domain,
            elapsed_seconds: elapsed,
            favicon: session.favicon,
        })
    }
}

/// Elapsed wall-clock seconds. Rounds half down so a 1.5s visit counts one
/// second; a negative delta from a clock adjustment collapses to zero and is
/// then discarded by the minimum-session filter.
fn rounded_seconds(delta: chrono::Duration) -> u64 {
    let ms = delta.num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    (ms / 1000 + i64::from(ms % 1000 > 500)) as u64
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{SessionTracker, TrackerConfig};
    use crate::host::tracking::target::TabTarget;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn at(seconds: f64) -> DateTime<Utc> {
        start() + chrono::Duration::milliseconds((seconds * 1000.) as i64)
    }

    fn tracked(domain: &str) -> TabTarget {
        TabTarget::Tracked {
            domain: domain.into(),
            favicon: None,
        }
    }

    fn tracker() -> SessionTracker {
        SessionTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_domain_change_closes_previous_session() {
        let mut tracker = tracker();
        assert_eq!(tracker.switch_to(tracked("news.example"), at(0.)), None);

        let record = tracker.switch_to(tracked("shop.example"), at(12.)).unwrap();
        assert_eq!(&*record.domain, "news.example");
        assert_eq!(record.elapsed_seconds, 12);
        assert_eq!(tracker.current_domain().map(|d| &**d), Some("shop.example"));
    }

    #[test]
    fn test_same_domain_keeps_session_running() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));
        assert_eq!(tracker.switch_to(tracked("news.example"), at(5.)), None);

        // The original start time still counts.
        let record = tracker.close_out(at(8.)).unwrap();
        assert_eq!(record.elapsed_seconds, 8);
    }

    #[test]
    fn test_untracked_target_closes_without_reopening() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));

        let record = tracker.switch_to(TabTarget::Untracked, at(10.)).unwrap();
        assert_eq!(&*record.domain, "news.example");
        assert_eq!(tracker.current_domain(), None);

        // Navigating away later produces nothing: there is no session.
        assert_eq!(tracker.switch_to(tracked("shop.example"), at(20.)), None);
    }

    #[test]
    fn test_short_session_discarded() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));
        assert_eq!(tracker.close_out(at(0.4)), None);
    }

    #[test]
    fn test_elapsed_rounds_half_down() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));
        let record = tracker.close_out(at(1.5)).unwrap();
        assert_eq!(record.elapsed_seconds, 1);

        tracker.switch_to(tracked("news.example"), at(10.));
        let record = tracker.close_out(at(11.6)).unwrap();
        assert_eq!(record.elapsed_seconds, 2);
    }

    #[test]
    fn test_negative_elapsed_discarded() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(10.));
        // Clock moved backwards.
        assert_eq!(tracker.close_out(at(5.)), None);
        assert_eq!(tracker.current_domain(), None);
    }

    #[test]
    fn test_close_out_cap() {
        let mut tracker = SessionTracker::new(TrackerConfig {
            max_close_out: Some(Duration::from_secs(30)),
            ..TrackerConfig::default()
        });
        tracker.switch_to(tracked("news.example"), at(0.));
        let record = tracker.close_out(at(300.)).unwrap();
        assert_eq!(record.elapsed_seconds, 30);
    }

    #[test]
    fn test_flush_reopens_same_domain() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));

        let record = tracker.flush(at(30.)).unwrap();
        assert_eq!(record.elapsed_seconds, 30);
        assert_eq!(tracker.current_domain().map(|d| &**d), Some("news.example"));

        // The reopened session starts at the flush point.
        let record = tracker.close_out(at(40.)).unwrap();
        assert_eq!(record.elapsed_seconds, 10);
    }

    #[test]
    fn test_flush_without_session_is_noop() {
        let mut tracker = tracker();
        assert_eq!(tracker.flush(at(30.)), None);
    }

    #[test]
    fn test_attach_favicon_guards_stale_results() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));
        tracker.switch_to(tracked("shop.example"), at(5.));

        // Late result for the ended session must not touch the current one.
        tracker.attach_favicon("news.example", "news.png".into());
        let record = tracker.close_out(at(10.)).unwrap();
        assert_eq!(record.favicon, None);
    }

    #[test]
    fn test_attach_favicon_applies_to_current_session() {
        let mut tracker = tracker();
        tracker.switch_to(tracked("news.example"), at(0.));
        assert_eq!(
            tracker.favicon_needed().as_deref(),
            Some("news.example")
        );

        tracker.attach_favicon("news.example", "news.png".into());
        assert_eq!(tracker.favicon_needed(), None);

        let record = tracker.close_out(at(10.)).unwrap();
        assert_eq!(record.favicon.as_deref(), Some("news.png"));
    }

    #[test]
    fn test_attribution_is_conserved_across_switches() {
        // news 0→12, shop 12→20, news 20→30: every attributed second lands in
        // exactly one record.
        let mut tracker = tracker();
        let mut records = vec![];

        records.extend(tracker.switch_to(tracked("news.example"), at(0.)));
        records.extend(tracker.switch_to(tracked("shop.example"), at(12.)));
        records.extend(tracker.switch_to(tracked("news.example"), at(20.)));
        records.extend(tracker.close_out(at(30.)));

        let total: u64 = records.iter().map(|r| r.elapsed_seconds).sum();
        assert_eq!(total, 30);

        let news: u64 = records
            .iter()
            .filter(|r| &*r.domain == "news.example")
            .map(|r| r.elapsed_seconds)
            .sum();
        assert_eq!(news, 22);
    }
}
