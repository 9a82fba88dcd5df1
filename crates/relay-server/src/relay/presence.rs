//! Presence broadcaster: pushes the online set to the admin.
//!
//! Snapshots are full state. A client replaces its whole view on each
//! `presence_updated`, so a lost intermediate update never causes drift.

use super::registry::Entries;
use relay_core::{Identity, ServerEvent};
use std::collections::BTreeSet;
use tracing::trace;

/// Computes presence snapshots and sends them to the admin connection.
#[derive(Debug, Clone)]
pub struct PresenceBroadcaster {
    admin: Identity,
}

impl PresenceBroadcaster {
    pub fn new(admin: Identity) -> Self {
        Self { admin }
    }

    /// Every registered identity except the admin.
    pub fn snapshot(&self, entries: &Entries) -> BTreeSet<Identity> {
        let mut online = entries.identities();
        online.remove(&self.admin);
        online
    }

    /// Send the current snapshot to the admin if it is connected. The
    /// snapshot is computed either way and returned to the caller.
    pub fn broadcast(&self, entries: &Entries) -> BTreeSet<Identity> {
        let online = self.snapshot(entries);
        match entries.lookup(&self.admin) {
            Some(admin) => {
                trace!(online = online.len(), "pushing presence to admin");
                admin.send(ServerEvent::PresenceUpdated {
                    online: online.clone(),
                });
            }
            None => trace!(online = online.len(), "admin offline, presence not sent"),
        }
        online
    }
}
