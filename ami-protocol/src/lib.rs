//! ami-protocol: Wire-level AMI definitions for amibridge
//!
//! This crate defines the message and action types exchanged with an
//! Asterisk Manager Interface server, the codec that frames them over a
//! TCP byte stream, and the parsers for administrative command output.

pub mod codec;
pub mod message;
pub mod output;

// Re-export main types at crate root
pub use codec::{AmiCodec, CodecError};
pub use message::{Action, Message};
pub use output::{parse_channels, parse_endpoints, ChannelRecord, EndpointRecord};

/// Default AMI TCP port
pub const DEFAULT_AMI_PORT: u16 = 5038;
