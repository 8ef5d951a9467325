//! Execution frames
//!
//! A [`Frame`] holds the variable slots a statement tree executes against. It
//! is a shared handle: a `when` statement captures a clone of it so the
//! trigger can evaluate its condition and run its body against the same
//! bindings long after the creating statement returned.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::errors::RuntimeError;
use super::host::{Host, SessionId};
use super::statements::StmtId;
use super::trigger::Trigger;
use super::types::Val;

struct FrameInner {
    slots: RefCell<Vec<Option<Val>>>,
    host: Rc<Host>,
    session: Option<SessionId>,
    next_stmt: Cell<Option<StmtId>>,
    delayed: RefCell<Option<Rc<Trigger>>>,
}

/// Shared variable-binding context
#[derive(Clone)]
pub struct Frame(Rc<FrameInner>);

impl Frame {
    pub fn new(size: usize, host: Rc<Host>) -> Self {
        Self::build(size, host, None)
    }

    /// Frame owned by a session; triggers created against it are cancelled
    /// when the session closes
    pub fn with_session(size: usize, host: Rc<Host>, session: SessionId) -> Self {
        Self::build(size, host, Some(session))
    }

    fn build(size: usize, host: Rc<Host>, session: Option<SessionId>) -> Self {
        Frame(Rc::new(FrameInner {
            slots: RefCell::new(vec![None; size]),
            host,
            session,
            next_stmt: Cell::new(None),
            delayed: RefCell::new(None),
        }))
    }

    pub fn size(&self) -> usize {
        self.0.slots.borrow().len()
    }

    /// Value bound to `slot`; `name` is only used for the error
    pub fn get(&self, slot: usize, name: &str) -> Result<Val, RuntimeError> {
        self.0
            .slots
            .borrow()
            .get(slot)
            .cloned()
            .flatten()
            .ok_or_else(|| RuntimeError::Unbound(name.to_string()))
    }

    pub fn is_bound(&self, slot: usize) -> bool {
        matches!(self.0.slots.borrow().get(slot), Some(Some(_)))
    }

    pub fn set(&self, slot: usize, value: Val) {
        let mut slots = self.0.slots.borrow_mut();
        if slot >= slots.len() {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(value);
    }

    pub fn clear(&self, slot: usize) {
        if let Some(s) = self.0.slots.borrow_mut().get_mut(slot) {
            *s = None;
        }
    }

    pub fn host(&self) -> &Rc<Host> {
        &self.0.host
    }

    pub fn session(&self) -> Option<SessionId> {
        self.0.session
    }

    /// Record the statement about to execute, for debuggers
    pub fn set_next_stmt(&self, id: Option<StmtId>) {
        self.0.next_stmt.set(id);
    }

    pub fn next_stmt(&self) -> Option<StmtId> {
        self.0.next_stmt.get()
    }

    /// Whether a `return when` has deferred this frame's result
    pub fn has_delayed(&self) -> bool {
        self.0.delayed.borrow().is_some()
    }

    pub fn set_delayed(&self, trigger: Rc<Trigger>) {
        *self.0.delayed.borrow_mut() = Some(trigger);
    }

    /// The trigger that will produce this frame's deferred result
    pub fn delayed_trigger(&self) -> Option<Rc<Trigger>> {
        self.0.delayed.borrow().clone()
    }

    /// Number of live handles to this frame (the caller's included)
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("slots", &self.0.slots.borrow().len())
            .field("session", &self.0.session)
            .field("delayed", &self.has_delayed())
            .finish()
    }
}
