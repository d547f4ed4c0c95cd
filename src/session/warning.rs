use super::signals::{SessionSignal, SignalBus, Subscription};
use super::store::{LogoutReason, SessionStore};

/// Answer to the expiry warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningChoice {
    /// Dismiss; the session still ends on schedule
    Continue,
    LogoutNow,
}

impl WarningChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "c" | "continue" | "stay" => Some(Self::Continue),
            "l" | "logout" | "logout now" | "quit" => Some(Self::LogoutNow),
            _ => None,
        }
    }
}

/// Observer side of the `session:warn` signal
pub struct WarningDialog {
    subscription: Subscription,
    open: bool,
}

impl WarningDialog {
    pub fn new(bus: &SignalBus) -> Self {
        Self {
            subscription: bus.subscribe(),
            open: false,
        }
    }

    /// Drain pending signals. Returns true if the dialog just opened.
    pub fn poll(&mut self) -> bool {
        let mut opened = false;
        while let Some(signal) = self.subscription.try_next() {
            match signal {
                SessionSignal::Warn if !self.open => {
                    self.open = true;
                    opened = true;
                }
                SessionSignal::Warn => {}
            }
        }
        opened
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close without an answer, e.g. because the session already ended
    pub fn dismiss(&mut self) {
        self.open = false;
    }

    /// Stop observing the bus
    pub fn close(self) {
        self.subscription.unsubscribe();
    }

    /// Apply the user's answer. Returns true if the session was ended.
    pub fn respond(&mut self, choice: WarningChoice, store: &mut SessionStore) -> bool {
        self.open = false;
        match choice {
            WarningChoice::Continue => false,
            WarningChoice::LogoutNow => store.logout(LogoutReason::Warning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::Route;
    use crate::session::store::testing::harness;
    use crate::session::store::{TimerOutcome, TIMESTAMP_KEY};
    use crate::session::timers::TimerKind;
    use crate::storage::MemoryStore;

    #[test]
    fn test_parse_choice() {
        assert_eq!(WarningChoice::parse("Continue"), Some(WarningChoice::Continue));
        assert_eq!(WarningChoice::parse(""), Some(WarningChoice::Continue));
        assert_eq!(WarningChoice::parse(" logout "), Some(WarningChoice::LogoutNow));
        assert_eq!(WarningChoice::parse("maybe"), None);
    }

    #[test]
    fn test_logout_now_from_warning() {
        let mut h = harness(MemoryStore::new());
        let mut dialog = WarningDialog::new(h.store.signals());
        h.store.login("Ana", "a@x.com").unwrap();

        h.clock.advance(3_000_000);
        let warn = h.sched.fire(TimerKind::Warn).unwrap();
        assert_eq!(h.store.handle_timer(warn), TimerOutcome::Warned);
        assert!(dialog.poll());
        assert!(dialog.is_open());

        assert!(dialog.respond(WarningChoice::LogoutNow, &mut h.store));
        assert!(!dialog.is_open());
        assert!(!h.store.is_authenticated());
        assert_eq!(h.storage.value(TIMESTAMP_KEY), None);
        assert_eq!(h.nav.last(), Some(Route::Login));
        assert!(h.sched.active_of(TimerKind::Logout).is_empty());
        assert_eq!(h.sched.canceled_count(), 1);
    }

    #[test]
    fn test_continue_keeps_logout_timer() {
        let mut h = harness(MemoryStore::new());
        let mut dialog = WarningDialog::new(h.store.signals());
        h.store.login("Ana", "a@x.com").unwrap();

        let warn = h.sched.fire(TimerKind::Warn).unwrap();
        h.store.handle_timer(warn);
        assert!(dialog.poll());
        // Already open: a second poll doesn't reopen
        assert!(!dialog.poll());

        assert!(!dialog.respond(WarningChoice::Continue, &mut h.store));
        assert!(h.store.is_authenticated());
        assert_eq!(h.sched.active_of(TimerKind::Logout).len(), 1);
    }

    #[test]
    fn test_closed_dialog_stops_observing() {
        let mut h = harness(MemoryStore::new());
        let dialog = WarningDialog::new(h.store.signals());
        let other = WarningDialog::new(h.store.signals());
        assert_eq!(h.store.signals().subscriber_count(), 2);

        dialog.close();
        assert_eq!(h.store.signals().subscriber_count(), 1);

        h.store.login("Ana", "a@x.com").unwrap();
        let warn = h.sched.fire(TimerKind::Warn).unwrap();
        h.store.handle_timer(warn);
        drop(other);
        assert_eq!(h.store.signals().subscriber_count(), 0);
    }

    #[test]
    fn test_no_warning_without_signal() {
        let h = harness(MemoryStore::new());
        let mut dialog = WarningDialog::new(h.store.signals());
        assert!(!dialog.poll());
        dialog.dismiss();
        assert!(!dialog.is_open());
    }
}
