//! Action correlation
//!
//! Bridges the inbound message stream to request/response callers. The
//! correlator is owned exclusively by the connection task, which is the
//! single mutation domain for the pending table; callers only ever hold
//! the receiving half of a completion slot.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use ami_protocol::Message;
use ami_utils::{AmiError, Result};

/// Completed exchange for one action: the response frame plus the list
/// events accumulated when the server answered with an event list. The
/// completion-marker event is included as the final list entry.
#[derive(Debug)]
pub struct ActionResponse {
    pub response: Message,
    pub events: Vec<Message>,
}

pub type ResponseSender = oneshot::Sender<Result<ActionResponse>>;

/// Bookkeeping for one in-flight action. Resolved exactly once: the
/// completion slot is consumed on first use and the entry leaves the table
/// with it.
struct PendingAction {
    tx: ResponseSender,
    deadline: Instant,
    /// Response frame that opened an event list, when one did
    response: Option<Message>,
    events: Vec<Message>,
}

/// Allocates correlation identifiers and matches inbound frames to the
/// pending callers. Identifiers are monotonic and scoped to one
/// connection; a correlator never outlives its transport.
pub struct Correlator {
    next_id: u64,
    timeout: Duration,
    pending: HashMap<u64, PendingAction>,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: 1,
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next identifier and store the caller's completion slot
    pub fn register(&mut self, tx: ResponseSender, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(
            id,
            PendingAction {
                tx,
                deadline: now + self.timeout,
                response: None,
                events: Vec::new(),
            },
        );
        id
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Route an inbound message.
    ///
    /// Returns the message back when no pending action claims it, so the
    /// caller can forward it to the event dispatcher. Stale responses for
    /// identifiers that already resolved are dropped.
    pub fn on_message(&mut self, msg: Message) -> Option<Message> {
        let Some(id) = msg.action_id() else {
            return Some(msg);
        };

        if !self.pending.contains_key(&id) {
            if msg.is_response() {
                debug!(action_id = id, "Dropping stale response");
                return None;
            }
            return Some(msg);
        }

        if msg.is_response() {
            if msg.starts_event_list() {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry.response = Some(msg);
                }
            } else if let Some(entry) = self.pending.remove(&id) {
                let _ = entry.tx.send(Ok(ActionResponse {
                    response: msg,
                    events: entry.events,
                }));
            }
        } else if msg.completes_event_list() {
            if let Some(mut entry) = self.pending.remove(&id) {
                entry.events.push(msg);
                // A completion without its start response is a server quirk;
                // resolve with an empty response frame rather than hang.
                let response = entry.response.take().unwrap_or_default();
                let _ = entry.tx.send(Ok(ActionResponse {
                    response,
                    events: entry.events,
                }));
            }
        } else if let Some(entry) = self.pending.get_mut(&id) {
            entry.events.push(msg);
        }

        None
    }

    /// Fail every entry past its deadline with `Timeout`. Returns the
    /// number of entries swept.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.pending.remove(id) {
                debug!(action_id = id, "Action timed out");
                let _ = entry.tx.send(Err(AmiError::Timeout {
                    seconds: self.timeout.as_secs(),
                }));
            }
        }

        expired.len()
    }

    /// Fail every pending entry with `ConnectionLost`. Called when the
    /// transport dies so no caller is left hanging across a reconnect.
    pub fn fail_all(&mut self) {
        for (_, entry) in self.pending.drain() {
            let _ = entry.tx.send(Err(AmiError::ConnectionLost));
        }
    }
}
