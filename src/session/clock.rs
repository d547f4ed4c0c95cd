//! Session timing math.
//!
//! All values are milliseconds since the Unix epoch (timestamps) or signed
//! millisecond offsets (delays). A non-positive delay means the event is due.

#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::rc::Rc;

/// Total session lifetime: 1 hour
pub const SESSION_DURATION: i64 = 60 * 60 * 1000;

/// Lead time before expiry at which the user is warned: 10 minutes
pub const WARNING_BEFORE: i64 = 10 * 60 * 1000;

/// Source of wall-clock "now"
pub trait Clock {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to, or by a fixed step after every read.
/// Clones share the same instant.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
    step: Rc<Cell<i64>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(now_ms)),
            step: Rc::default(),
        }
    }

    /// Advance by `step_ms` after each `now_ms()` call
    pub fn set_step(&self, step_ms: i64) {
        self.step.set(step_ms);
    }

    pub fn set(&self, now_ms: i64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, by_ms: i64) {
        self.now.set(self.now.get() + by_ms);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        let now = self.now.get();
        self.now.set(now + self.step.get());
        now
    }
}

/// Delay until the expiry warning should fire
pub fn warning_delay(login_ts: i64, now: i64) -> i64 {
    login_ts
        .saturating_add(SESSION_DURATION - WARNING_BEFORE)
        .saturating_sub(now)
}

/// Delay until the session expires
pub fn logout_delay(login_ts: i64, now: i64) -> i64 {
    login_ts.saturating_add(SESSION_DURATION).saturating_sub(now)
}

pub fn is_expired(login_ts: i64, now: i64) -> bool {
    now.saturating_sub(login_ts) >= SESSION_DURATION
}

/// A login more than a full session ahead of `now` can't have come from
/// this clock; the stored value is corrupt
pub fn is_implausible(login_ts: i64, now: i64) -> bool {
    login_ts > now.saturating_add(SESSION_DURATION)
}
