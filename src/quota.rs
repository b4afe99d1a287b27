//! Process-wide send quota with a lazily reset window.
//!
//! A send passes through two steps: [`QuotaTracker::try_admit`] reserves a
//! slot, and [`Admission::commit`] turns the reservation into a counted send
//! once the message has been delivered and logged. Dropping an `Admission`
//! without committing gives the slot back, so failed sends never use quota.
//!
//! Admission succeeds only while `count + in_flight < limit`, which keeps
//! concurrent sends from over-admitting even though no lock is held while
//! the send is in progress.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::Clock;

#[derive(Debug)]
struct QuotaWindow {
    window_start: Instant,
    count: u32,
    in_flight: u32,
    total_sent: u64,
}

impl QuotaWindow {
    /// Start a fresh window if the current one has run its course.
    /// In-flight reservations carry over into the new window.
    fn roll(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.window_start = now;
            self.count = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("send quota exceeded")]
pub struct QuotaExceeded {
    /// Time left until the current window ends.
    pub retry_after: Duration,
}

/// Read-only snapshot of the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaStatus {
    pub count: u32,
    pub limit: u32,
    pub total_sent: u64,
    pub window_start: Instant,
    pub elapsed: Duration,
    /// The window has elapsed but no request has reset it yet.
    pub expired: bool,
}

impl QuotaStatus {
    /// Count the next send will be measured against.
    pub fn effective_count(&self) -> u32 {
        if self.expired {
            0
        } else {
            self.count
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.effective_count())
    }

    pub fn limit_reached(&self) -> bool {
        self.effective_count() >= self.limit
    }
}

#[derive(Debug)]
pub struct QuotaTracker {
    limit: u32,
    window: Duration,
    state: Mutex<QuotaWindow>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let state = QuotaWindow {
            window_start: clock.now(),
            count: 0,
            in_flight: 0,
            total_sent: 0,
        };

        Self {
            limit,
            window,
            state: Mutex::new(state),
            clock,
        }
    }

    // Every critical section leaves the window consistent, so a poisoned
    // lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, QuotaWindow> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn try_admit(&self) -> Result<Admission<'_>, QuotaExceeded> {
        let now = self.clock.now();
        let mut state = self.state();
        state.roll(now, self.window);

        if state.count + state.in_flight >= self.limit {
            let elapsed = now.saturating_duration_since(state.window_start);
            return Err(QuotaExceeded {
                retry_after: self.window.saturating_sub(elapsed),
            });
        }

        state.in_flight += 1;
        Ok(Admission {
            tracker: self,
            settled: false,
        })
    }

    pub fn status(&self) -> QuotaStatus {
        let now = self.clock.now();
        let state = self.state();
        let elapsed = now.saturating_duration_since(state.window_start);

        QuotaStatus {
            count: state.count,
            limit: self.limit,
            total_sent: state.total_sent,
            window_start: state.window_start,
            elapsed,
            expired: elapsed >= self.window,
        }
    }
}

/// A reserved quota slot.
#[must_use = "an admission is released unless committed"]
#[derive(Debug)]
pub struct Admission<'a> {
    tracker: &'a QuotaTracker,
    settled: bool,
}

impl Admission<'_> {
    /// Record the send against the quota and return the window's new count.
    pub fn commit(mut self) -> u32 {
        let now = self.tracker.clock.now();
        let mut state = self.tracker.state();
        state.roll(now, self.tracker.window);
        state.in_flight -= 1;
        state.count += 1;
        state.total_sent += 1;
        self.settled = true;
        state.count
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.state().in_flight -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    const HOUR: Duration = Duration::from_secs(3600);

    fn tracker(limit: u32) -> (QuotaTracker, MockClock) {
        let clock = MockClock::default();
        (QuotaTracker::new(limit, HOUR, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_admits_up_to_limit() {
        let (quota, _) = tracker(3);
        for expected in 1..=3 {
            assert_eq!(quota.try_admit().unwrap().commit(), expected);
        }
        assert!(quota.try_admit().is_err());
        assert_eq!(quota.status().count, 3);
        assert!(quota.status().limit_reached());
    }

    #[test]
    fn test_uncommitted_admission_is_released() {
        let (quota, _) = tracker(1);
        {
            let _admission = quota.try_admit().unwrap();
            assert!(quota.try_admit().is_err());
        }
        assert_eq!(quota.status().count, 0);
        assert_eq!(quota.try_admit().unwrap().commit(), 1);
    }

    #[test]
    fn test_window_resets_lazily() {
        let (quota, clock) = tracker(2);
        quota.try_admit().unwrap().commit();
        quota.try_admit().unwrap().commit();

        clock.advance(Duration::from_secs(1800));
        let exceeded = quota.try_admit().unwrap_err();
        assert_eq!(exceeded.retry_after, Duration::from_secs(1800));

        clock.advance(Duration::from_secs(1800));
        let status = quota.status();
        assert!(status.expired);
        assert_eq!(status.count, 2);
        assert_eq!(status.effective_count(), 0);

        assert_eq!(quota.try_admit().unwrap().commit(), 1);
        let status = quota.status();
        assert!(!status.expired);
        assert_eq!(status.count, 1);
        assert_eq!(status.total_sent, 3);
    }

    #[test]
    fn test_status_does_not_mutate() {
        let (quota, clock) = tracker(1);
        quota.try_admit().unwrap().commit();
        clock.advance(HOUR * 2);

        let before = quota.status();
        let after = quota.status();
        assert_eq!(before.window_start, after.window_start);
        assert_eq!(after.count, 1);
    }

    #[test]
    fn test_in_flight_survives_reset() {
        let (quota, clock) = tracker(1);
        let admission = quota.try_admit().unwrap();
        clock.advance(HOUR);

        // the pending send still holds the only slot in the new window
        assert!(quota.try_admit().is_err());
        assert_eq!(admission.commit(), 1);
        assert!(quota.status().limit_reached());
    }

    #[test]
    fn test_concurrent_admissions_respect_limit() {
        let (quota, _) = tracker(5);
        let quota = Arc::new(quota);
        let barrier = Arc::new(std::sync::Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let quota = Arc::clone(&quota);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    quota.try_admit().map(|a| a.commit()).is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
        assert_eq!(quota.status().count, 5);
    }
}
