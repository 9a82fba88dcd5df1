//! Presence-tracked message relay: registry, presence, and routing.

pub mod presence;
pub mod registry;
pub mod router;

pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, Delivery};
pub use router::MessageRouter;
