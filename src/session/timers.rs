//! One-shot cancelable timers.
//!
//! Timers never run session logic themselves. When one fires it posts a
//! [`TimerEvent`] to the owning thread, which hands it to the session store.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Warn,
    Logout,
}

/// A fired timer. `epoch` identifies the arming that scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub kind: TimerKind,
    pub epoch: u64,
}

pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle;

    /// Cancel a pending timer. Unknown or already-fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Scheduler backed by one sleeper thread per timer.
///
/// Each sleeper waits on its own cancel channel. A timeout means the timer is
/// due and the event is sent to `events`; a message or a dropped sender means it
/// was canceled.
pub struct ThreadScheduler<M> {
    events: Sender<M>,
    next_id: u64,
    pending: HashMap<u64, Sender<()>>,
}

impl<M> ThreadScheduler<M> {
    pub fn new(events: Sender<M>) -> Self {
        Self {
            events,
            next_id: 0,
            pending: HashMap::new(),
        }
    }
}

impl<M: From<TimerEvent> + Send + 'static> Scheduler for ThreadScheduler<M> {
    fn schedule(&mut self, delay: Duration, event: TimerEvent) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let events = self.events.clone();
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                // Receiver gone means the event loop already shut down
                let _ = events.send(M::from(event));
            }
        });

        self.pending.insert(id, cancel_tx);
        tracing::trace!(id, ?delay, ?event, "timer scheduled");
        TimerHandle(id)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(cancel_tx) = self.pending.remove(&handle.0) {
            let _ = cancel_tx.send(());
            tracing::trace!(id = handle.0, "timer canceled");
        }
    }
}

impl<M> Drop for ThreadScheduler<M> {
    fn drop(&mut self) {
        for (_, cancel_tx) in self.pending.drain() {
            let _ = cancel_tx.send(());
        }
    }
}

#[cfg(test)]
pub use manual::ManualScheduler;


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;

    fn scheduler() -> (ThreadScheduler<TimerEvent>, Receiver<TimerEvent>) {
        let (tx, rx) = mpsc::channel();
        (ThreadScheduler::new(tx), rx)
    }

    #[test]
    fn test_thread_timer_fires() {
        let (mut sched, rx) = scheduler();
        let event = TimerEvent {
            kind: TimerKind::Warn,
            epoch: 3,
        };
        sched.schedule(Duration::from_millis(10), event);
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, event);
    }

    #[test]
    fn test_thread_timer_cancel() {
        let (mut sched, rx) = scheduler();
        let handle = sched.schedule(
            Duration::from_millis(200),
            TimerEvent {
                kind: TimerKind::Logout,
                epoch: 1,
            },
        );
        sched.cancel(handle);
        // Second cancel is a no-op
        sched.cancel(handle);
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_drop_cancels_pending() {
        let (mut sched, rx) = scheduler();
        sched.schedule(
            Duration::from_millis(200),
            TimerEvent {
                kind: TimerKind::Logout,
                epoch: 1,
            },
        );
        drop(sched);
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_manual_scheduler_fire_and_cancel() {
        let mut sched = ManualScheduler::new();
        let warn = TimerEvent {
            kind: TimerKind::Warn,
            epoch: 1,
        };
        let logout = TimerEvent {
            kind: TimerKind::Logout,
            epoch: 1,
        };
        sched.schedule(Duration::from_millis(5), warn);
        let h = sched.schedule(Duration::from_millis(10), logout);
        assert_eq!(sched.active().len(), 2);

        assert_eq!(sched.fire(TimerKind::Warn), Some(warn));
        sched.cancel(h);
        sched.cancel(h);
        assert!(sched.active().is_empty());
        assert_eq!(sched.canceled_count(), 1);
        assert_eq!(sched.scheduled_total(), 2);
    }
}
