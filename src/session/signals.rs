use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// Signals raised by the session store for whoever is listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// The session expires soon
    Warn,
}

impl SessionSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Warn => "session:warn",
        }
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    senders: Vec<(u64, Sender<SessionSignal>)>,
}

/// Observer list for session signals. Clones share the same subscribers.
#[derive(Clone, Default)]
pub struct SignalBus {
    subscribers: Rc<RefCell<Subscribers>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut subs = self.subscribers.borrow_mut();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.senders.push((id, tx));
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Deliver `signal` to every live subscriber
    pub fn emit(&self, signal: SessionSignal) {
        let mut subs = self.subscribers.borrow_mut();
        subs.senders.retain(|(_, tx)| tx.send(signal).is_ok());
        tracing::debug!(signal = signal.name(), listeners = subs.senders.len(), "signal emitted");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().senders.len()
    }

    fn remove(&self, id: u64) {
        self.subscribers
            .borrow_mut()
            .senders
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

/// A registered observer. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: Receiver<SessionSignal>,
    bus: SignalBus,
}

impl Subscription {
    /// Next pending signal, if any
    pub fn try_next(&self) -> Option<SessionSignal> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn unsubscribe(self) {
        let bus = self.bus.clone();
        drop(self);
        tracing::debug!(listeners = bus.subscriber_count(), "unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.remove(self.id);
    }
}
