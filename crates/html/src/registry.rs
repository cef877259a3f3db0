//! The suspense registry.
//!
//! One `SuspenseRoot` is owned per render thread and passed explicitly; there
//! is no process-global state. It maps request ids to their live sessions.
//!
//! Invariants:
//! - A request's entry exists from the start of its streaming render until
//!   its sink is closed; removal and close happen together.
//! - Once enabled, a root stays enabled.
//! - Mutation only happens on the owning thread (`Rc`/`RefCell`); a
//!   multi-threaded host keeps one root per thread.

use crate::session::RequestSession;
use core_types::RequestId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct RootState {
    enabled: bool,
    next_request: RequestId,
    requests: HashMap<RequestId, Rc<RequestSession>>,
}

impl Default for RootState {
    fn default() -> Self {
        Self {
            enabled: false,
            next_request: 1,
            requests: HashMap::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct SuspenseRoot {
    state: Rc<RefCell<RootState>>,
}

pub(crate) type WeakRoot = Weak<RefCell<RootState>>;

impl SuspenseRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        let mut state = self.state.borrow_mut();
        if !state.enabled {
            log::debug!(target: "html.suspense", "suspense enabled");
            state.enabled = true;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    /// An id no live request is using.
    pub fn next_request_id(&self) -> RequestId {
        let mut state = self.state.borrow_mut();
        loop {
            let id = state.next_request;
            state.next_request = state.next_request.wrapping_add(1).max(1);
            if !state.requests.contains_key(&id) {
                return id;
            }
        }
    }

    /// Returns false, leaving the existing entry, if `id` is already live.
    pub(crate) fn insert(&self, id: RequestId, session: Rc<RequestSession>) -> bool {
        let mut state = self.state.borrow_mut();
        if state.requests.contains_key(&id) {
            return false;
        }
        state.requests.insert(id, session);
        true
    }

    pub fn get(&self, id: RequestId) -> Option<Rc<RequestSession>> {
        self.state.borrow().requests.get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: RequestId) -> Option<Rc<RequestSession>> {
        self.state.borrow_mut().requests.remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.state.borrow().requests.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop delivering output for `id`. In-flight work still runs to
    /// completion and is discarded. Returns false for unknown ids.
    pub fn cancel(&self, id: RequestId) -> bool {
        let Some(session) = self.get(id) else {
            return false;
        };
        log::debug!(target: "html.suspense", "cancel request {id}");
        session.cancel();
        true
    }

    pub(crate) fn downgrade(&self) -> WeakRoot {
        Rc::downgrade(&self.state)
    }

    pub(crate) fn remove_from(root: &WeakRoot, id: RequestId) {
        if let Some(state) = root.upgrade() {
            state.borrow_mut().requests.remove(&id);
        }
    }
}

impl fmt::Debug for SuspenseRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SuspenseRoot")
            .field("enabled", &state.enabled)
            .field("requests", &state.requests.len())
            .finish()
    }
}
