//! Deferred `when` evaluation
//!
//! A `when` statement never blocks. Executing it packages the condition, the
//! bodies and the current frame into a [`Trigger`] and hands that to the
//! [`TriggerMgr`]. The manager re-evaluates pending triggers when the host
//! asks it to and times them out as network time advances.
//!
//! ```text
//! Pending --condition true--> Fired      (body runs)
//!         --deadline passed-> TimedOut   (timeout body runs, if any)
//!         --session closed--> Cancelled  (nothing runs)
//! ```
//!
//! Every transition out of `Pending` drops the captured frame and
//! expressions, so a terminal trigger holds nothing but its result.

use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use uuid::Uuid;

use super::expressions::Expr;
use super::frame::Frame;
use super::host::SessionId;
use super::statements::Stmt;
use super::types::{Flow, Span, Val};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Pending,
    Fired,
    TimedOut,
    Cancelled,
}

impl TriggerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TriggerState::Pending)
    }
}

/// What a pending trigger needs to run later
struct Captured {
    cond: Rc<Expr>,
    body: Rc<Stmt>,
    timeout_body: Option<Rc<Stmt>>,
    frame: Frame,
}

pub struct Trigger {
    id: Uuid,
    captured: RefCell<Option<Captured>>,
    deadline: Option<DateTime<Utc>>,
    session: Option<SessionId>,
    is_return: bool,
    span: Span,
    state: Cell<TriggerState>,
    result: RefCell<Option<Val>>,
}

impl Trigger {
    pub fn new(
        cond: Rc<Expr>,
        body: Rc<Stmt>,
        timeout_body: Option<Rc<Stmt>>,
        deadline: Option<DateTime<Utc>>,
        frame: Frame,
        is_return: bool,
        span: Span,
    ) -> Rc<Self> {
        let id = Uuid::new_v4();
        tracing::debug!(trigger = %id, line = span.start_line, ?deadline, "trigger created");
        Rc::new(Self {
            id,
            session: frame.session(),
            captured: RefCell::new(Some(Captured {
                cond,
                body,
                timeout_body,
                frame,
            })),
            deadline,
            is_return,
            span,
            state: Cell::new(TriggerState::Pending),
            result: RefCell::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TriggerState {
        self.state.get()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn is_return(&self) -> bool {
        self.is_return
    }

    /// Value produced by the body of a `return when`
    pub fn result(&self) -> Option<Val> {
        self.result.borrow().clone()
    }

    /// Whether the trigger still holds its frame and expressions
    pub fn holds_frame(&self) -> bool {
        self.captured.borrow().is_some()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }

    /// Check the condition once; fire if it holds.
    ///
    /// An evaluation error (a binding that went away, a missing table entry)
    /// means the condition is not ready yet; the trigger stays pending.
    pub fn eval(&self) -> TriggerState {
        if self.state.get().is_terminal() {
            return self.state.get();
        }

        let (cond, frame) = match self.captured.borrow().as_ref() {
            Some(c) => (Rc::clone(&c.cond), c.frame.clone()),
            None => return self.state.get(),
        };

        match cond.eval(&frame) {
            Ok(v) if !v.is_zero() => self.fire(),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(trigger = %self.id, error = %e, "trigger condition not ready");
            }
        }
        self.state.get()
    }

    fn fire(&self) {
        let Some(captured) = self.captured.borrow_mut().take() else {
            return;
        };
        self.state.set(TriggerState::Fired);
        tracing::debug!(trigger = %self.id, "trigger fired");

        let mut flow = Flow::Next;
        match captured.body.exec(&captured.frame, &mut flow) {
            Ok(v) => {
                if self.is_return {
                    *self.result.borrow_mut() = v;
                }
            }
            Err(e) => {
                tracing::warn!(trigger = %self.id, line = self.span.start_line, error = %e, "when body aborted");
            }
        }
    }

    /// Deadline passed without the condition holding
    pub fn timeout(&self) {
        if self.state.get().is_terminal() {
            return;
        }
        let Some(captured) = self.captured.borrow_mut().take() else {
            return;
        };
        self.state.set(TriggerState::TimedOut);
        tracing::debug!(trigger = %self.id, "trigger timed out");

        if let Some(body) = &captured.timeout_body {
            let mut flow = Flow::Next;
            match body.exec(&captured.frame, &mut flow) {
                Ok(v) => {
                    if self.is_return {
                        *self.result.borrow_mut() = v;
                    }
                }
                Err(e) => {
                    tracing::warn!(trigger = %self.id, line = self.span.start_line, error = %e, "when timeout body aborted");
                }
            }
        }
    }

    /// Drop everything without running any body
    pub fn cancel(&self) {
        if self.state.get().is_terminal() {
            return;
        }
        self.captured.borrow_mut().take();
        self.state.set(TriggerState::Cancelled);
        tracing::debug!(trigger = %self.id, "trigger cancelled");
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("deadline", &self.deadline)
            .field("session", &self.session)
            .finish()
    }
}

/* ===================== Scheduler ===================== */

/// Counters kept by the trigger manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    pub registered: u64,
    pub fired: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub refused: u64,
}

/// Scheduler for pending triggers.
///
/// Registration only queues a trigger; its first evaluation happens in the
/// next [`check_all`](Self::check_all), after the registering statement has
/// returned. A pass evaluates each trigger at most once, so a body that
/// registers a new trigger cannot make the pass spin on the same one.
pub struct TriggerMgr {
    pending: RefCell<Vec<Rc<Trigger>>>,
    fresh: RefCell<Vec<Rc<Trigger>>>,
    open_sessions: RefCell<HashSet<SessionId>>,
    next_session: Cell<u64>,
    max_pending: Option<usize>,
    stats: Cell<TriggerStats>,
}

impl TriggerMgr {
    pub fn new(max_pending: Option<usize>) -> Self {
        Self {
            pending: RefCell::new(Vec::new()),
            fresh: RefCell::new(Vec::new()),
            open_sessions: RefCell::new(HashSet::new()),
            next_session: Cell::new(1),
            max_pending,
            stats: Cell::new(TriggerStats::default()),
        }
    }

    pub fn new_session(&self) -> SessionId {
        let id = SessionId(self.next_session.get());
        self.next_session.set(id.0 + 1);
        self.open_sessions.borrow_mut().insert(id);
        id
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.open_sessions.borrow().contains(&session)
    }

    /// Tear down a session and cancel every trigger it owns
    pub fn close_session(&self, session: SessionId) {
        if !self.open_sessions.borrow_mut().remove(&session) {
            return;
        }
        let owned: Vec<Rc<Trigger>> = self
            .pending
            .borrow()
            .iter()
            .chain(self.fresh.borrow().iter())
            .filter(|t| t.session() == Some(session))
            .cloned()
            .collect();
        tracing::debug!(%session, triggers = owned.len(), "closing session");
        for t in &owned {
            t.cancel();
        }
        self.bump(|s| s.cancelled += owned.len() as u64);
        self.prune();
    }

    /// Queue a trigger for evaluation. Returns false (and cancels the trigger)
    /// when its session is already closed or the pending limit is reached.
    pub fn register(&self, trigger: Rc<Trigger>) -> bool {
        if let Some(session) = trigger.session() {
            if !self.is_open(session) {
                tracing::warn!(trigger = %trigger.id(), %session, "trigger registered on a closed session");
                trigger.cancel();
                self.bump(|s| s.refused += 1);
                return false;
            }
        }
        if let Some(max) = self.max_pending {
            if self.pending_count() >= max {
                tracing::warn!(trigger = %trigger.id(), max, "too many pending triggers, dropping new one");
                trigger.cancel();
                self.bump(|s| s.refused += 1);
                return false;
            }
        }
        self.bump(|s| s.registered += 1);
        self.fresh.borrow_mut().push(trigger);
        true
    }

    /// Evaluate every pending trigger once, then any registered while doing
    /// so, until no new registrations appear
    pub fn check_all(&self, _now: DateTime<Utc>) {
        let mut batch = {
            let mut pending = self.pending.borrow_mut();
            let mut fresh = self.fresh.borrow_mut();
            let mut all = std::mem::take(&mut *pending);
            all.append(&mut fresh);
            all
        };

        while !batch.is_empty() {
            for t in &batch {
                if t.eval() == TriggerState::Fired {
                    self.bump(|s| s.fired += 1);
                }
            }
            for t in &batch {
                // a body in this pass may have closed the session
                if let Some(session) = t.session() {
                    if !t.state().is_terminal() && !self.is_open(session) {
                        t.cancel();
                        self.bump(|s| s.cancelled += 1);
                    }
                }
            }
            self.pending
                .borrow_mut()
                .extend(batch.into_iter().filter(|t| !t.state().is_terminal()));
            batch = std::mem::take(&mut *self.fresh.borrow_mut());
        }
    }

    /// Time out every trigger whose deadline is at or before `now`
    pub fn expire(&self, now: DateTime<Utc>) {
        let expired: Vec<Rc<Trigger>> = {
            let mut pending = self.pending.borrow_mut();
            let (expired, keep) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|t| t.is_expired(now));
            *pending = keep;
            expired
        };
        for t in &expired {
            t.timeout();
        }
        self.bump(|s| s.timed_out += expired.len() as u64);
        self.prune();
    }

    /// Cancel everything still outstanding
    pub fn cancel_all(&self) {
        let all: Vec<Rc<Trigger>> = {
            let mut pending = self.pending.borrow_mut();
            let mut fresh = self.fresh.borrow_mut();
            let mut all = std::mem::take(&mut *pending);
            all.append(&mut fresh);
            all
        };
        for t in &all {
            t.cancel();
        }
        self.bump(|s| s.cancelled += all.len() as u64);
    }

    /// Pending triggers, including registrations not yet evaluated
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len() + self.fresh.borrow().len()
    }

    pub fn stats(&self) -> TriggerStats {
        self.stats.get()
    }

    fn prune(&self) {
        self.pending
            .borrow_mut()
            .retain(|t| !t.state().is_terminal());
        self.fresh.borrow_mut().retain(|t| !t.state().is_terminal());
    }

    fn bump(&self, f: impl FnOnce(&mut TriggerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}
