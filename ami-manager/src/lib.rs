//! ami-manager: persistent AMI client core
//!
//! Owns one TCP connection to an Asterisk Manager Interface server,
//! logging in on connect and reconnecting forever on loss. Submitted
//! actions are correlated to their responses (single-message or
//! event-list); frames that answer no pending action fan out to
//! registered event handlers.

pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod manager;

pub use ami_protocol::{Action, Message};
pub use config::ManagerConfig;
pub use connection::ConnectionState;
pub use correlator::ActionResponse;
pub use dispatcher::ManagerEvent;
pub use manager::{CoreStatus, Manager};
