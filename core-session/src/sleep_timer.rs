//! # Sleep Timer
//!
//! Pauses playback after a listener-chosen number of minutes.
//!
//! At most one timer is armed. Arming replaces the previous timer, and every
//! timer carries a [`TimerId`] so a fire signal that raced with a re-arm or
//! cancel is recognised as stale and ignored. The timer itself never touches
//! the transport: it sends [`SleepSignal`]s to the session driver, which
//! decides whether playback is still running.

use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Message sent from a timer task to the session driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepSignal {
    /// The deadline passed.
    Expired(TimerId),
    /// Time to republish the remaining minutes.
    Refresh(TimerId),
}

/// Countdown shown to the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SleepTimerStatus {
    pub minutes: u32,
    /// Minutes left, rounded up.
    pub remaining_minutes: u32,
    pub deadline_at: DateTime<Utc>,
}

struct ArmedTimer {
    id: TimerId,
    minutes: u32,
    deadline: Instant,
    deadline_at: DateTime<Utc>,
    fire: JoinHandle<()>,
    refresh: JoinHandle<()>,
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        self.fire.abort();
        self.refresh.abort();
    }
}

pub struct SleepTimer {
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    signals: mpsc::UnboundedSender<SleepSignal>,
    next_id: u64,
    armed: Option<ArmedTimer>,
}

impl SleepTimer {
    pub fn new(
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
        signals: mpsc::UnboundedSender<SleepSignal>,
    ) -> Self {
        Self {
            clock,
            refresh_interval,
            signals,
            next_id: 0,
            armed: None,
        }
    }

    /// Arms a timer for `minutes`, replacing any armed timer.
    ///
    /// `arm(0)` only clears the current timer and returns `None`.
    pub fn arm(&mut self, minutes: u32) -> Option<SleepTimerStatus> {
        self.cancel();
        if minutes == 0 {
            return None;
        }

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let now = Instant::now();
        let deadline = now + Duration::from_secs(u64::from(minutes) * 60);
        let deadline_at = self.clock.now() + chrono::Duration::minutes(i64::from(minutes));

        let fire_tx = self.signals.clone();
        let fire = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = fire_tx.send(SleepSignal::Expired(id));
        });

        let refresh_tx = self.signals.clone();
        let period = self.refresh_interval;
        let refresh = tokio::spawn(async move {
            let mut ticker = interval_at(now + period, period);
            loop {
                ticker.tick().await;
                if refresh_tx.send(SleepSignal::Refresh(id)).is_err() {
                    break;
                }
            }
        });

        debug!(minutes, timer = id.0, "Sleep timer armed");
        self.armed = Some(ArmedTimer {
            id,
            minutes,
            deadline,
            deadline_at,
            fire,
            refresh,
        });
        self.status()
    }

    /// Clears the armed timer without firing. Returns `true` if one was armed.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }

    /// Consumes an expiry signal. Returns `true` only when `id` is the armed
    /// timer; the timer is cleared in that case.
    pub fn take_expired(&mut self, id: TimerId) -> bool {
        if self.is_current(id) {
            self.armed = None;
            true
        } else {
            false
        }
    }

    pub fn is_current(&self, id: TimerId) -> bool {
        self.armed.as_ref().is_some_and(|armed| armed.id == id)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn remaining_minutes(&self) -> Option<u32> {
        self.armed.as_ref().map(|armed| {
            let remaining = armed.deadline.saturating_duration_since(Instant::now());
            remaining.as_millis().div_ceil(60_000) as u32
        })
    }

    pub fn status(&self) -> Option<SleepTimerStatus> {
        let remaining_minutes = self.remaining_minutes()?;
        self.armed.as_ref().map(|armed| SleepTimerStatus {
            minutes: armed.minutes,
            remaining_minutes,
            deadline_at: armed.deadline_at,
        })
    }
}

impl Drop for SleepTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
