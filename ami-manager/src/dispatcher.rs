//! Event fan-out for unsolicited traffic
//!
//! Messages that answer no pending action, plus connection state changes,
//! are delivered synchronously to registered handlers in registration
//! order. A panicking handler is isolated and reported; the remaining
//! handlers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use ami_protocol::Message;

use crate::connection::ConnectionState;

/// Everything the dispatcher delivers
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// The connection moved to a new state
    StateChanged(ConnectionState),
    /// An unsolicited server message (notification, peer status, ...)
    Event(Message),
}

type HandlerFn = dyn Fn(&ManagerEvent) + Send + Sync;

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Mutex<Vec<Arc<HandlerFn>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers run in registration order
    pub fn register(&self, handler: impl Fn(&ManagerEvent) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    /// Deliver an event to every handler. The handler table is snapshotted
    /// first so a handler may register further handlers without deadlock.
    pub fn dispatch(&self, event: &ManagerEvent) {
        let handlers: Vec<Arc<HandlerFn>> = self.handlers.lock().clone();
        for (index, handler) in handlers.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(handler = index, "Event handler panicked; continuing with remaining handlers");
            }
        }
    }
}
