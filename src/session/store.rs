//! Session store: authentication status, the persisted login timestamp, and
//! the warn/logout timer pair for the current session.
//!
//! Every mutation happens on the thread that owns the store. Timers only post
//! [`TimerEvent`]s; the owner feeds them back through [`SessionStore::handle_timer`].

use super::clock::{self, Clock};
use super::signals::{SessionSignal, SignalBus};
use super::timers::{Scheduler, TimerEvent, TimerHandle, TimerKind};
use crate::api::{ApiError, AuthGateway};
use crate::navigation::{Navigator, Route};
use crate::storage::KeyValueStore;
use std::time::Duration;
use thiserror::Error;

/// Storage key holding the login timestamp as decimal milliseconds
pub const TIMESTAMP_KEY: &str = "login_timestamp";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Login failed: {0}")]
    AuthRejected(#[source] ApiError),

    #[error("Failed to save session: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// Explicit logout
    User,
    /// Chosen from the expiry warning
    Warning,
    /// Session lifetime ran out
    Expired,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Warning => "warning",
            Self::Expired => "expired",
        }
    }
}

/// Result of [`SessionStore::restore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    Resumed { login_ts: i64 },
    /// A stored session was too old (or unreadable) and was cleared
    Expired,
    NoSession,
}

/// What a delivered timer event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Warned,
    Expired,
    /// Superseded or arrived after logout
    Ignored,
}

#[derive(Debug, Default)]
struct ArmedTimers {
    warn: Option<TimerHandle>,
    logout: Option<TimerHandle>,
}

pub struct SessionStore {
    gateway: Box<dyn AuthGateway>,
    storage: Box<dyn KeyValueStore>,
    navigator: Box<dyn Navigator>,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    signals: SignalBus,
    login_timestamp: Option<i64>,
    timers: ArmedTimers,
    /// Bumped on every arming so late events from an older pair are ignored
    epoch: u64,
}

impl SessionStore {
    pub fn new(
        gateway: Box<dyn AuthGateway>,
        storage: Box<dyn KeyValueStore>,
        navigator: Box<dyn Navigator>,
        clock: Box<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            gateway,
            storage,
            navigator,
            clock,
            scheduler,
            signals: SignalBus::new(),
            login_timestamp: None,
            timers: ArmedTimers::default(),
            epoch: 0,
        }
    }

    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    pub fn login_timestamp(&self) -> Option<i64> {
        self.login_timestamp
    }

    pub fn is_authenticated(&self) -> bool {
        let now = self.clock.now_ms();
        self.login_timestamp
            .is_some_and(|ts| !clock::is_expired(ts, now))
    }

    /// Milliseconds until the session expires, if logged in
    pub fn remaining(&self) -> Option<i64> {
        let now = self.clock.now_ms();
        self.login_timestamp
            .map(|ts| clock::logout_delay(ts, now).max(0))
    }

    /// Pick up a session persisted by an earlier run
    pub fn restore(&mut self) -> Restore {
        let stored = match self.storage.get(TIMESTAMP_KEY) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to read stored session: {:#}", e);
                None
            }
        };
        let Some(raw) = stored else {
            return Restore::NoSession;
        };

        let now = self.clock.now_ms();
        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|ts| !clock::is_implausible(*ts, now));
        match parsed {
            Some(login_ts) if !clock::is_expired(login_ts, now) => {
                tracing::info!(login_ts, "session restored");
                self.login_timestamp = Some(login_ts);
                self.arm_timers(login_ts);
                // Arming may find the session already over
                if self.login_timestamp.is_none() {
                    return Restore::Expired;
                }
                Restore::Resumed { login_ts }
            }
            Some(_) => {
                tracing::info!("stored session expired");
                self.clear_stored_session();
                Restore::Expired
            }
            None => {
                tracing::warn!(value = %raw, "discarding unreadable stored session");
                self.clear_stored_session();
                Restore::Expired
            }
        }
    }

    fn clear_stored_session(&mut self) {
        if let Err(e) = self.storage.remove(TIMESTAMP_KEY) {
            tracing::warn!("failed to clear stored session: {:#}", e);
        }
    }

    /// Authenticate against the server and start a new session.
    /// On failure nothing changes.
    pub fn login(&mut self, name: &str, email: &str) -> Result<(), SessionError> {
        self.gateway
            .login(name, email)
            .map_err(SessionError::AuthRejected)?;

        let now = self.clock.now_ms();
        self.storage
            .set(TIMESTAMP_KEY, &now.to_string())
            .map_err(SessionError::Storage)?;

        tracing::info!(login_ts = now, "logged in");
        self.login_timestamp = Some(now);
        self.arm_timers(now);
        self.navigator.go_to(Route::Search);
        Ok(())
    }

    /// End the session and go to the login surface.
    /// Returns false when there was no session to end.
    pub fn logout(&mut self, reason: LogoutReason) -> bool {
        let ended = self.login_timestamp.take().is_some();
        if ended {
            self.cancel_timers();
            self.clear_stored_session();
            if let Err(e) = self.gateway.logout() {
                // An expired session's credential is normally already dead server-side
                if reason == LogoutReason::Expired {
                    tracing::debug!("server logout failed: {}", e);
                } else {
                    tracing::warn!("server logout failed: {}", e);
                }
            }
            tracing::info!(reason = reason.as_str(), "logged out");
        }
        self.navigator.go_to(Route::Login);
        ended
    }

    /// Apply a fired timer
    pub fn handle_timer(&mut self, event: TimerEvent) -> TimerOutcome {
        if event.epoch != self.epoch || self.login_timestamp.is_none() {
            tracing::debug!(?event, current_epoch = self.epoch, "ignoring stale timer");
            return TimerOutcome::Ignored;
        }

        match event.kind {
            TimerKind::Warn => {
                if let Some(handle) = self.timers.warn.take() {
                    self.scheduler.cancel(handle);
                }
                self.signals.emit(SessionSignal::Warn);
                TimerOutcome::Warned
            }
            TimerKind::Logout => {
                self.logout(LogoutReason::Expired);
                TimerOutcome::Expired
            }
        }
    }

    /// Replace the timer pair for a session that started at `login_ts`
    fn arm_timers(&mut self, login_ts: i64) {
        self.cancel_timers();
        self.epoch += 1;

        let now = self.clock.now_ms();
        let warn_in = clock::warning_delay(login_ts, now);
        let logout_in = clock::logout_delay(login_ts, now);

        if logout_in <= 0 {
            self.logout(LogoutReason::Expired);
            return;
        }

        // A warning that is already due is skipped; only logout is authoritative
        if warn_in > 0 {
            let event = TimerEvent {
                kind: TimerKind::Warn,
                epoch: self.epoch,
            };
            self.timers.warn = Some(self.scheduler.schedule(millis(warn_in), event));
        }

        let event = TimerEvent {
            kind: TimerKind::Logout,
            epoch: self.epoch,
        };
        self.timers.logout = Some(self.scheduler.schedule(millis(logout_in), event));

        tracing::debug!(epoch = self.epoch, warn_in, logout_in, "session timers armed");
    }

    fn cancel_timers(&mut self) {
        if let Some(handle) = self.timers.warn.take() {
            self.scheduler.cancel(handle);
        }
        if let Some(handle) = self.timers.logout.take() {
            self.scheduler.cancel(handle);
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::navigation::RecordingNavigator;
    use crate::session::clock::ManualClock;
    use crate::session::timers::ManualScheduler;
    use crate::storage::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub const T0: i64 = 1_700_000_000_000;

    /// Auth gateway fake that records calls and can be told to fail
    #[derive(Debug, Clone, Default)]
    pub struct FakeAuth {
        pub logins: Rc<RefCell<Vec<(String, String)>>>,
        pub logouts: Rc<RefCell<usize>>,
        pub reject: Rc<RefCell<bool>>,
    }

    impl AuthGateway for FakeAuth {
        fn login(&self, name: &str, email: &str) -> crate::api::ApiResult<()> {
            if *self.reject.borrow() {
                return Err(ApiError::Status {
                    code: 401,
                    body: "Unauthorized".to_string(),
                });
            }
            self.logins
                .borrow_mut()
                .push((name.to_string(), email.to_string()));
            Ok(())
        }

        fn logout(&self) -> crate::api::ApiResult<()> {
            *self.logouts.borrow_mut() += 1;
            Ok(())
        }
    }

    pub struct Harness {
        pub store: SessionStore,
        pub auth: FakeAuth,
        pub storage: MemoryStore,
        pub nav: RecordingNavigator,
        pub clock: ManualClock,
        pub sched: ManualScheduler,
    }

    pub fn harness(storage: MemoryStore) -> Harness {
        let auth = FakeAuth::default();
        let nav = RecordingNavigator::new();
        let clock = ManualClock::new(T0);
        let sched = ManualScheduler::new();
        let store = SessionStore::new(
            Box::new(auth.clone()),
            Box::new(storage.clone()),
            Box::new(nav.clone()),
            Box::new(clock.clone()),
            Box::new(sched.clone()),
        );
        Harness {
            store,
            auth,
            storage,
            nav,
            clock,
            sched,
        }
    }
}
