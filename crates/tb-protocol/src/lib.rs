//! tb-protocol: Wire protocol for the ticket-broker socket interface
//!
//! This crate defines the length-prefixed JSON framing used between local
//! callers and the broker daemon over a Unix domain socket.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{BrokerCodec, CallerCodec, JsonFrameCodec};
pub use error::FramingError;
pub use frame::{LEN_PREFIX_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{ClientRequest, Credentials, ServerResponse};
