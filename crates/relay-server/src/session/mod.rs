//! Session lifecycle: binds transport connections to identities.

pub mod lifecycle;

pub use lifecycle::{Session, SessionHandler, SessionState};
