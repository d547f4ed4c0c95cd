//! Session lifecycle: login timestamp persistence, expiry warning and
//! automatic logout.
//!
//! A session lasts [`clock::SESSION_DURATION`] from login. The store arms two
//! timers per session: a warning [`clock::WARNING_BEFORE`] ahead of expiry and
//! the logout itself. Timers only post events; the thread that owns the store
//! applies them, so every state change happens in one place.

pub mod clock;
pub mod signals;
pub mod store;
pub mod timers;
pub mod warning;

pub use clock::SystemClock;
pub use store::{LogoutReason, Restore, SessionError, SessionStore, TimerOutcome};
pub use timers::{ThreadScheduler, TimerEvent};
pub use warning::{WarningChoice, WarningDialog};
