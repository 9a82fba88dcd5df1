//! relay-core: Shared protocol library for the admin relay.
//!
//! Provides participant identities, the client/server event types, the
//! JSON/CBOR frame codec, and the common error type.

pub mod codec;
pub mod error;
pub mod identity;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_frame, encode_frame, Frame, WireFormat};
pub use error::{RelayError, RelayResult};
pub use identity::Identity;
pub use messages::{ClientEvent, PrivateMessage, ServerEvent};
