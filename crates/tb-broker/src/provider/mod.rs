//! Provider implementations shipped with the broker
//!
//! The production adapter for a real authentication service plugs in through
//! `tb_core::provider::AuthProvider`; the broker itself only ships the
//! deterministic development provider.

mod dev;

pub use dev::DevProvider;
