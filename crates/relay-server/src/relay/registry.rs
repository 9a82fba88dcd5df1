//! Connection registry: which identity is reachable through which connection.
//!
//! Holds at most one live connection per identity. Every read and write goes
//! through a single lock, and presence is pushed to the admin while the write
//! guard is still held, so observers never see a mutation without its
//! matching snapshot (or snapshots out of order).

use super::presence::PresenceBroadcaster;
use relay_core::{Identity, ServerEvent};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

/// Server-assigned connection number. Unique for the process lifetime.
pub type ConnectionId = u64;

/// Outbound side of one live transport connection.
///
/// Created by the transport when a client connects. Two handles are equal
/// only if they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for this connection without waiting.
    pub fn send(&self, event: ServerEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Sent(self.id),
            Err(TrySendError::Full(ev)) => {
                debug!(conn_id = self.id, kind = ev.kind(), "outbound queue full, event dropped");
                Delivery::Dropped(self.id)
            }
            Err(TrySendError::Closed(ev)) => {
                trace!(conn_id = self.id, kind = ev.kind(), "connection closed, event dropped");
                Delivery::Dropped(self.id)
            }
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// What happened to an event handed to the registry for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the given connection.
    Sent(ConnectionId),
    /// The connection exists but could not take the event.
    Dropped(ConnectionId),
    /// Nobody is registered under the target identity.
    Unreachable,
}

/// A registered identity and its connection.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub identity: Identity,
    pub handle: ConnectionHandle,
    pub registered_at: Instant,
}

/// Unlocked registry state. Both maps always describe the same set of entries.
#[derive(Debug, Default)]
pub struct Entries {
    by_identity: HashMap<Identity, RegistryEntry>,
    by_conn: HashMap<ConnectionId, Identity>,
}

impl Entries {
    pub fn lookup(&self, identity: &Identity) -> Option<&ConnectionHandle> {
        self.by_identity.get(identity).map(|e| &e.handle)
    }

    pub fn identities(&self) -> BTreeSet<Identity> {
        self.by_identity.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Insert or replace. Returns the superseded handle, if any.
    fn insert(&mut self, identity: Identity, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let conn_id = handle.id;

        // A connection is bound to at most one identity.
        if let Some(previous) = self.by_conn.insert(conn_id, identity.clone()) {
            if previous != identity {
                self.by_identity.remove(&previous);
            }
        }

        let entry = RegistryEntry {
            identity: identity.clone(),
            handle,
            registered_at: Instant::now(),
        };
        let old = self.by_identity.insert(identity, entry)?;
        if old.handle.id == conn_id {
            return None;
        }
        self.by_conn.remove(&old.handle.id);
        Some(old.handle)
    }

    fn remove_conn(&mut self, id: ConnectionId) -> Option<RegistryEntry> {
        let identity = self.by_conn.remove(&id)?;
        self.by_identity.remove(&identity)
    }
}

/// The authoritative identity → connection table.
pub struct ConnectionRegistry {
    admin: Identity,
    entries: RwLock<Entries>,
    presence: PresenceBroadcaster,
}

impl ConnectionRegistry {
    /// Create an empty registry for the given admin identity.
    pub fn new(admin: Identity) -> Self {
        Self {
            presence: PresenceBroadcaster::new(admin.clone()),
            admin,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn admin(&self) -> &Identity {
        &self.admin
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        *identity == self.admin
    }

    /// Bind `identity` to `handle`, replacing any previous connection for it.
    ///
    /// Presence is pushed to the admin unless `identity` is the admin itself.
    pub async fn register(&self, identity: Identity, handle: ConnectionHandle) {
        let mut entries = self.entries.write().await;
        let conn_id = handle.id();
        let superseded = entries.insert(identity.clone(), handle);

        match superseded {
            Some(old) => info!(
                identity = %identity,
                conn_id,
                superseded = old.id(),
                "identity re-registered on new connection"
            ),
            None => info!(identity = %identity, conn_id, "identity registered"),
        }

        if !self.is_admin(&identity) {
            self.presence.broadcast(&entries);
        }
    }

    /// Drop whatever entry belongs to `handle`. A handle that was superseded
    /// (or never registered) leaves the registry untouched.
    pub async fn unregister(&self, handle: &ConnectionHandle) -> Option<Identity> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove_conn(handle.id())?;

        info!(identity = %removed.identity, conn_id = handle.id(), "identity unregistered");

        if !self.is_admin(&removed.identity) {
            self.presence.broadcast(&entries);
        }
        Some(removed.identity)
    }

    /// Current connection for `identity`.
    pub async fn lookup(&self, identity: &Identity) -> Option<ConnectionHandle> {
        self.entries.read().await.lookup(identity).cloned()
    }

    /// Snapshot of every registered identity, admin included.
    pub async fn current_identities(&self) -> BTreeSet<Identity> {
        self.entries.read().await.identities()
    }

    /// Resolve `identity` and queue `event` on its connection in one step, so
    /// the event can't land on a connection superseded mid-delivery.
    pub async fn deliver(&self, identity: &Identity, event: ServerEvent) -> Delivery {
        let entries = self.entries.read().await;
        match entries.lookup(identity) {
            Some(handle) => handle.send(event),
            None => Delivery::Unreachable,
        }
    }

    /// Push the current presence snapshot to the admin, if connected.
    pub async fn broadcast_presence(&self) -> BTreeSet<Identity> {
        let entries = self.entries.read().await;
        self.presence.broadcast(&entries)
    }

    /// Number of registered identities.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}
