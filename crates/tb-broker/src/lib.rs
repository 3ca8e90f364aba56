//! tb-broker: Local broker daemon issuing session tickets
//!
//! Accepts connections on a Unix domain socket, logs into the external
//! authentication provider on behalf of each caller, and returns a
//! hex-encoded session ticket. One connection is one session: at most one
//! success response, then the connection closes.

pub mod provider;
pub mod server;
pub mod session;

pub use server::BrokerServer;
pub use session::{Session, SessionStage};
