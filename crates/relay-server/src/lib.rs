//! relay-server library.
//! Exposes the relay modules for integration testing; the binary entry
//! point is in main.rs.

pub mod config;
pub mod directory;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;
