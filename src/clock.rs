//! Live session clock.
//!
//! Elapsed time is always derived from the absolute session start, so a tick only has to
//! wake the renderer. Missed or late ticks never cause drift.

use time::OffsetDateTime;
use tokio::time::{Duration, Interval, MissedTickBehavior};

pub const TICK: Duration = Duration::from_secs(1);

/// Whole seconds between `started_at` and `now`, floored and clamped at zero.
pub fn elapsed_seconds(started_at: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let secs = (now - started_at).whole_seconds();
    u64::try_from(secs).unwrap_or(0)
}

/// Elapsed time for an optional open-session start; zero when nothing is open.
pub fn elapsed_since(started_at: Option<OffsetDateTime>, now: OffsetDateTime) -> u64 {
    started_at.map_or(0, |s| elapsed_seconds(s, now))
}

/// `HH:MM:SS`, zero padded. Hours are not wrapped.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Periodic wake-up bound to one open session.
///
/// The ticker remembers which session it belongs to so a new session (or a different item
/// whose session happens to be open) gets a fresh ticker instead of inheriting the old one.
pub struct SessionTicker {
    session_id: String,
    interval: Interval,
}

impl SessionTicker {
    pub fn new(session_id: String) -> Self {
        let mut interval = tokio::time::interval(TICK);
        // Catching up on missed ticks is pointless; elapsed time is recomputed anyway.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            session_id,
            interval,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_minutes_and_seconds() {
        let now = datetime!(2024-05-01 12:00:00 UTC);
        let started = now - time::Duration::seconds(125);
        assert_eq!(format_hms(elapsed_seconds(started, now)), "00:02:05");
    }

    #[test]
    fn formats_hours() {
        let now = datetime!(2024-05-01 12:00:00 UTC);
        let started = now - time::Duration::seconds(3661);
        assert_eq!(format_hms(elapsed_seconds(started, now)), "01:01:01");
    }

    #[test]
    fn hours_do_not_wrap() {
        assert_eq!(format_hms(100 * 3600), "100:00:00");
        assert_eq!(format_hms(0), "00:00:00");
    }

    #[test]
    fn sub_second_remainder_is_floored() {
        let now = datetime!(2024-05-01 12:00:00.999 UTC);
        let started = datetime!(2024-05-01 11:59:58 UTC);
        assert_eq!(elapsed_seconds(started, now), 2);
    }

    #[test]
    fn start_in_the_future_clamps_to_zero() {
        let now = datetime!(2024-05-01 12:00:00 UTC);
        let started = now + time::Duration::seconds(30);
        assert_eq!(elapsed_seconds(started, now), 0);
        assert_eq!(elapsed_since(None, now), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_once_per_second() {
        let mut ticker = SessionTicker::new("s1".into());
        let begin = tokio::time::Instant::now();
        ticker.tick().await; // first tick is immediate
        ticker.tick().await;
        ticker.tick().await;
        assert_eq!(begin.elapsed(), Duration::from_secs(2));
        assert_eq!(ticker.session_id(), "s1");
    }
}
