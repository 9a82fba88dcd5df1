//! Relay protocol events.
//!
//! Every frame carries exactly one event, tagged by its `event` field:
//!
//! ```json
//! {"event":"identity_announced","identity":"alice"}
//! {"event":"private_message","from":"alice","to":"vishal","text":"hi"}
//! {"event":"presence_updated","online":["alice","bob"]}
//! ```

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A one-to-one chat message. Routed and discarded; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub from: Identity,
    pub to: Identity,
    pub text: String,
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to an identity.
    IdentityAnnounced { identity: Identity },
    PrivateMessage(PrivateMessage),
}

/// Events the relay pushes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    PrivateMessage(PrivateMessage),
    /// Full set of non-admin identities currently online. Replaces any
    /// previously received set.
    PresenceUpdated { online: BTreeSet<Identity> },
    /// Every identity known to the account directory, admin excluded.
    /// Sent once to the admin when its session starts.
    Roster { identities: BTreeSet<Identity> },
    Error { reason: String },
}

impl ServerEvent {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrivateMessage(_) => "private_message",
            Self::PresenceUpdated { .. } => "presence_updated",
            Self::Roster { .. } => "roster",
            Self::Error { .. } => "error",
        }
    }
}
