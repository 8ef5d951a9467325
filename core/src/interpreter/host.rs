//! Host facades
//!
//! The pieces of the surrounding system the statement engine talks to:
//! network time, the event queue `event` statements feed, the sink `print`
//! statements write to, and the trigger scheduler `when` statements register
//! with. A [`Host`] is shared by every frame of one engine instance.

use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::fmt;

use super::trigger::TriggerMgr;
use super::types::Val;
use crate::config::Config;

/// Owning execution context (a connection, in the host's terms). Triggers
/// created against a session's frames are cancelled when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// An event raised by an `event` statement, waiting for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub name: String,
    pub args: Vec<Val>,
}

impl fmt::Display for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Engine limits taken from configuration
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Abort a `while` loop after this many iterations
    pub max_loop_iterations: Option<u64>,
    /// Refuse trigger registrations beyond this many pending triggers
    pub max_pending_triggers: Option<usize>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_loop_iterations: config.engine.max_loop_iterations,
            max_pending_triggers: config.triggers.max_pending,
        }
    }
}

pub struct Host {
    now: Cell<DateTime<Utc>>,
    events: RefCell<Vec<QueuedEvent>>,
    output: RefCell<Vec<String>>,
    triggers: TriggerMgr,
    settings: EngineSettings,
}

impl Host {
    /// Host with network time starting at the epoch
    pub fn new(settings: EngineSettings) -> Self {
        Self::starting_at(DateTime::<Utc>::UNIX_EPOCH, settings)
    }

    pub fn starting_at(now: DateTime<Utc>, settings: EngineSettings) -> Self {
        Self {
            now: Cell::new(now),
            events: RefCell::new(Vec::new()),
            output: RefCell::new(Vec::new()),
            triggers: TriggerMgr::new(settings.max_pending_triggers),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(EngineSettings::from_config(config))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current network time
    pub fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    /// Move network time forward: pending conditions get one more look, then
    /// every trigger whose deadline has passed times out
    pub fn advance_time(&self, now: DateTime<Utc>) {
        if now < self.now.get() {
            tracing::warn!(%now, current = %self.now.get(), "ignoring attempt to move network time backwards");
            return;
        }
        self.now.set(now);
        self.triggers.check_all(now);
        self.triggers.expire(now);
    }

    pub fn triggers(&self) -> &TriggerMgr {
        &self.triggers
    }

    pub fn queue_event(&self, name: &str, args: Vec<Val>) {
        tracing::debug!(event = name, args = args.len(), "queueing event");
        self.events.borrow_mut().push(QueuedEvent {
            name: name.to_string(),
            args,
        });
    }

    pub fn drain_events(&self) -> Vec<QueuedEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn print(&self, line: String) {
        tracing::trace!(target: "sift::print", "{}", line);
        self.output.borrow_mut().push(line);
    }

    pub fn drain_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Cancel every outstanding trigger. Pending triggers hold their frames,
    /// and frames hold the host, so this is what lets a host be dropped.
    pub fn shutdown(&self) {
        self.triggers.cancel_all();
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("now", &self.now.get())
            .field("pending_triggers", &self.triggers.pending_count())
            .field("settings", &self.settings)
            .finish()
    }
}
