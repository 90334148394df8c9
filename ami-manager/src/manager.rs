//! Public manager handle
//!
//! The `Manager` is the narrow interface the surrounding service calls:
//! `execute`/`submit` for correlated commands, `is_ready` for the status
//! page, `register_event_handler` for unsolicited traffic. Cloning the
//! handle is cheap; all clones drive the same supervisor.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use ami_protocol::{parse_channels, parse_endpoints, Action, ChannelRecord, EndpointRecord, Message};
use ami_utils::{AmiError, Result};

use crate::config::ManagerConfig;
use crate::connection::{run_supervisor, ConnectionState, Shared, Submit};
use crate::correlator::ActionResponse;
use crate::dispatcher::ManagerEvent;

/// Handle to the AMI client core
#[derive(Clone)]
pub struct Manager {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Manager {
    /// Spawn the supervisor and return immediately. The connection is
    /// established in the background and retried forever; poll
    /// `state_changes` or `is_ready` to observe progress.
    pub fn connect(config: ManagerConfig) -> Self {
        let shared = Arc::new(Shared::new(config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_supervisor(shared.clone(), shutdown_rx));

        Self {
            shared,
            shutdown_tx,
            supervisor: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Watch channel following connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Failure that ended the most recent connection attempt, such as an
    /// `AuthFailure` after a rejected login. `None` once a connection
    /// reaches `Ready`.
    pub fn last_error(&self) -> Option<Arc<AmiError>> {
        self.shared.last_error.lock().clone()
    }

    /// Register a handler for unsolicited events and state changes
    pub fn register_event_handler(&self, handler: impl Fn(&ManagerEvent) + Send + Sync + 'static) {
        self.shared.dispatcher.register(handler);
    }

    /// Submit an action and await its correlated response.
    ///
    /// Fails with `NotConnected` without touching the wire when the
    /// connection is not `Ready`, so a degraded status page answers
    /// immediately instead of hanging.
    pub async fn submit(&self, action: Action) -> Result<ActionResponse> {
        let link = self.shared.link.lock().clone();
        let Some(link) = link else {
            return Err(AmiError::NotConnected);
        };

        let (tx, rx) = oneshot::channel();
        link.send(Submit { action, tx })
            .await
            .map_err(|_| AmiError::ConnectionLost)?;

        rx.await.map_err(|_| AmiError::ConnectionLost)?
    }

    /// Convenience form of `submit` for verb + parameter pairs
    pub async fn execute(&self, verb: &str, params: &[(&str, &str)]) -> Result<ActionResponse> {
        let mut action = Action::new(verb);
        for (key, value) in params {
            action = action.param(*key, *value);
        }
        self.submit(action).await
    }

    /// Core version/uptime/call-count snapshot (`CoreStatus` action)
    pub async fn core_status(&self) -> Result<CoreStatus> {
        let outcome = self.submit(Action::new("CoreStatus")).await?;
        Ok(CoreStatus::from_response(&outcome.response))
    }

    /// Registered endpoints parsed from `pjsip show endpoints` output
    pub async fn list_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        let outcome = self.submit(Action::command("pjsip show endpoints")).await?;
        Ok(parse_endpoints(outcome.response.body().unwrap_or("")))
    }

    /// Active channels parsed from `core show channels concise` output
    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let outcome = self
            .submit(Action::command("core show channels concise"))
            .await?;
        Ok(parse_channels(outcome.response.body().unwrap_or("")))
    }

    /// Stop the supervisor and drop the connection. Pending actions fail
    /// with `ConnectionLost`; subsequent submits fail with `NotConnected`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Switch-level status snapshot from a `CoreStatus` response
#[derive(Debug, Clone, Serialize)]
pub struct CoreStatus {
    pub version: String,
    pub uptime: String,
    pub reload_time: String,
    pub current_calls: u32,
}

impl CoreStatus {
    pub fn from_response(response: &Message) -> Self {
        Self {
            version: response.get("CoreVersion").unwrap_or("unknown").to_string(),
            uptime: response.get("CoreUptime").unwrap_or("unknown").to_string(),
            reload_time: response
                .get("CoreReloadTime")
                .unwrap_or("unknown")
                .to_string(),
            current_calls: response
                .get("CoreCurrentCalls")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        }
    }
}
