//! Connection lifecycle
//!
//! One supervisor task owns the transport: it connects, logs in, runs the
//! connection's read/write loop, and on any loss fails every pending
//! action with `ConnectionLost` before scheduling a reconnect. A fresh
//! `Correlator` is built per connection, so identifiers are scoped to one
//! transport and stale traffic can never resolve a successor's entries.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use ami_protocol::{Action, AmiCodec};
use ami_utils::AmiError;

use crate::config::ManagerConfig;
use crate::correlator::{Correlator, ResponseSender};
use crate::dispatcher::{EventDispatcher, ManagerEvent};

/// How often the correlator checks for expired deadlines
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
}

/// One submission from a caller: the action plus its completion slot
pub(crate) struct Submit {
    pub action: Action,
    pub tx: ResponseSender,
}

/// State shared between the `Manager` handle and the supervisor task
pub(crate) struct Shared {
    pub config: ManagerConfig,
    pub state_tx: watch::Sender<ConnectionState>,
    /// Submit queue of the current Ready connection; `None` otherwise
    pub link: Mutex<Option<mpsc::Sender<Submit>>>,
    pub dispatcher: EventDispatcher,
    /// Failure that ended the most recent connection attempt; cleared
    /// once a connection reaches `Ready`
    pub last_error: Mutex<Option<Arc<AmiError>>>,
}

impl Shared {
    pub fn new(config: ManagerConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state_tx,
            link: Mutex::new(None),
            dispatcher: EventDispatcher::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_error(&self, err: AmiError) {
        *self.last_error.lock() = Some(Arc::new(err));
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn set_state(&self, state: ConnectionState) {
        let changed = {
            let current = *self.state_tx.borrow();
            current != state
        };
        if changed {
            debug!(?state, "Connection state changed");
            // send_replace stores even with no subscribers
            self.state_tx.send_replace(state);
            self.dispatcher.dispatch(&ManagerEvent::StateChanged(state));
        }
    }
}

enum ConnectionEnd {
    /// Transport died; reconnect after the configured delay
    Lost,
    /// Explicit shutdown; stop the supervisor
    Shutdown,
}

/// Supervisor loop: retries forever with a fixed delay until shut down.
pub(crate) async fn run_supervisor(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let addr = shared.config.addr();

    loop {
        if *shutdown.borrow() {
            break;
        }

        shared.set_state(ConnectionState::Connecting);
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Connect failed");
                shared.record_error(AmiError::Io(e));
                shared.set_state(ConnectionState::Disconnected);
                if !sleep_or_shutdown(shared.config.reconnect_delay, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        info!(addr = %addr, "Transport connected, authenticating");
        let framed = Framed::new(stream, AmiCodec::new());
        let end = run_connection(framed, &shared, &mut shutdown).await;

        *shared.link.lock() = None;
        shared.set_state(ConnectionState::Disconnected);

        match end {
            ConnectionEnd::Shutdown => break,
            ConnectionEnd::Lost => {
                info!(
                    delay_ms = shared.config.reconnect_delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                if !sleep_or_shutdown(shared.config.reconnect_delay, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    *shared.link.lock() = None;
    shared.set_state(ConnectionState::Disconnected);
}

/// Returns false when shutdown was requested during the delay
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        result = shutdown.changed() => match result {
            Ok(()) => !*shutdown.borrow(),
            Err(_) => false,
        },
    }
}

/// Drives one connection: login handshake first, then the unified
/// select loop over caller submissions, inbound frames, the deadline
/// sweep and the shutdown signal.
async fn run_connection(
    mut framed: Framed<TcpStream, AmiCodec>,
    shared: &Arc<Shared>,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let mut correlator = Correlator::new(shared.config.action_timeout);
    let (submit_tx, mut submit_rx) = mpsc::channel::<Submit>(64);

    shared.set_state(ConnectionState::Authenticating);

    // The login handshake is an ordinary correlated action on this
    // connection's own correlator, so it shares the timeout machinery.
    let (login_tx, mut login_rx) = oneshot::channel();
    let login_id = correlator.register(login_tx, Instant::now());
    let login = Action::login(&shared.config.username, &shared.config.secret);
    if let Err(e) = framed.send((login_id, &login)).await {
        warn!(error = %e, "Failed to send login");
        correlator.fail_all();
        return ConnectionEnd::Lost;
    }

    let mut ready = false;
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            login_result = &mut login_rx, if !ready => {
                match login_result {
                    Ok(Ok(outcome)) if outcome.response.succeeded() => {
                        info!("Authenticated");
                        shared.clear_error();
                        *shared.link.lock() = Some(submit_tx.clone());
                        shared.set_state(ConnectionState::Ready);
                        ready = true;
                    }
                    Ok(Ok(outcome)) => {
                        let reason = outcome
                            .response
                            .get("Message")
                            .unwrap_or("login rejected")
                            .to_string();
                        let err = AmiError::AuthFailure(reason);
                        warn!(error = %err, "Authentication failed");
                        shared.record_error(err);
                        correlator.fail_all();
                        return ConnectionEnd::Lost;
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Login did not complete");
                        correlator.fail_all();
                        return ConnectionEnd::Lost;
                    }
                    Err(_) => {
                        correlator.fail_all();
                        return ConnectionEnd::Lost;
                    }
                }
            }

            Some(submit) = submit_rx.recv(), if ready => {
                let id = correlator.register(submit.tx, Instant::now());
                if let Err(e) = framed.send((id, &submit.action)).await {
                    warn!(error = %e, "Write failed");
                    correlator.fail_all();
                    return ConnectionEnd::Lost;
                }
            }

            frame = framed.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        if let Some(unclaimed) = correlator.on_message(msg) {
                            shared.dispatcher.dispatch(&ManagerEvent::Event(unclaimed));
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Transport decode error");
                        correlator.fail_all();
                        return ConnectionEnd::Lost;
                    }
                    None => {
                        info!("Server closed connection");
                        correlator.fail_all();
                        return ConnectionEnd::Lost;
                    }
                }
            }

            _ = sweep.tick() => {
                let swept = correlator.sweep(Instant::now());
                if swept > 0 {
                    warn!(count = swept, "Pending actions timed out");
                }
            }

            result = shutdown.changed() => {
                let stop = match result {
                    Ok(()) => *shutdown.borrow(),
                    Err(_) => true,
                };
                if stop {
                    if ready {
                        shared.set_state(ConnectionState::Closing);
                    }
                    correlator.fail_all();
                    return ConnectionEnd::Shutdown;
                }
            }
        }
    }
}
