//! Per-connection session lifecycle.
//!
//! ```text
//! Unidentified ──identity_announced──▶ Identified
//!       │                                  │
//!       └──────────── disconnected ────────┴──▶ Closed
//! ```
//!
//! Closed is terminal. Disconnecting always unregisters by handle, which is a
//! no-op for a connection that never announced or was superseded.

use crate::directory::AccountDirectory;
use crate::relay::{ConnectionHandle, ConnectionRegistry, Delivery, MessageRouter};
use relay_core::{ClientEvent, Identity, PrivateMessage, RelayError, RelayResult, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unidentified,
    Identified(Identity),
    Closed,
}

/// Shared wiring between transport events and the relay core.
pub struct SessionHandler {
    registry: Arc<ConnectionRegistry>,
    router: MessageRouter,
    directory: Arc<dyn AccountDirectory>,
    enforce_directory: bool,
}

impl SessionHandler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<dyn AccountDirectory>,
        enforce_directory: bool,
    ) -> Self {
        Self {
            router: MessageRouter::new(registry.clone()),
            registry,
            directory,
            enforce_directory,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Start tracking a freshly connected transport channel.
    pub fn open(self: &Arc<Self>, handle: ConnectionHandle) -> Session {
        debug!(conn_id = handle.id(), "session opened");
        Session {
            handler: self.clone(),
            handle,
            state: SessionState::Unidentified,
        }
    }

    /// Directory roster for the admin's view, admin removed.
    fn admin_roster(&self) -> Option<ServerEvent> {
        match self.directory.list_all_identities() {
            Ok(mut identities) => {
                identities.remove(self.registry.admin());
                Some(ServerEvent::Roster { identities })
            }
            Err(e) => {
                warn!(error = %e, "failed to list directory identities");
                None
            }
        }
    }
}

/// One connection's session.
pub struct Session {
    handler: Arc<SessionHandler>,
    handle: ConnectionHandle,
    state: SessionState,
}

impl Session {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Identified(id) => Some(id),
            _ => None,
        }
    }

    /// Apply one inbound client event.
    pub async fn handle_event(&mut self, event: ClientEvent) -> RelayResult<()> {
        match event {
            ClientEvent::IdentityAnnounced { identity } => self.announce(identity).await,
            ClientEvent::PrivateMessage(message) => {
                self.send_message(message).await?;
                Ok(())
            }
        }
    }

    /// Bind this connection to `identity`.
    ///
    /// The admin gets the directory roster queued before it becomes visible
    /// in the registry, so the roster always precedes the first presence
    /// snapshot on its connection.
    pub async fn announce(&mut self, identity: Identity) -> RelayResult<()> {
        if self.state == SessionState::Closed {
            return Err(RelayError::Transport("session closed".into()));
        }

        let handler = self.handler.clone();
        let is_admin = handler.registry.is_admin(&identity);

        if !is_admin && handler.enforce_directory && !handler.directory.verify(&identity) {
            info!(identity = %identity, conn_id = self.handle.id(), "rejected unregistered identity");
            return Err(RelayError::UnknownIdentity(identity.to_string()));
        }

        if is_admin {
            if let Some(roster) = handler.admin_roster() {
                self.handle.send(roster);
            }
        }

        handler.registry.register(identity.clone(), self.handle.clone()).await;

        if is_admin {
            handler.registry.broadcast_presence().await;
        }

        self.state = SessionState::Identified(identity);
        Ok(())
    }

    /// Route a message sent on this connection.
    ///
    /// Once identified, a connection may only send as the identity it
    /// announced. Unidentified connections are routed by the claimed `from`.
    pub async fn send_message(&mut self, message: PrivateMessage) -> RelayResult<Delivery> {
        match &self.state {
            SessionState::Closed => {
                return Err(RelayError::Transport("session closed".into()));
            }
            SessionState::Identified(me) if *me != message.from => {
                info!(
                    identity = %me,
                    claimed = %message.from,
                    conn_id = self.handle.id(),
                    "rejected message with foreign sender"
                );
                return Err(RelayError::InvalidMessage(format!(
                    "sender {} does not match announced identity {me}",
                    message.from
                )));
            }
            _ => {}
        }
        Ok(self.handler.router.route(message).await)
    }

    /// Transport went away. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.handler.registry.unregister(&self.handle).await;
        debug!(conn_id = self.handle.id(), "session closed");
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use std::collections::BTreeSet;
    use tokio::sync::mpsc;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn handler(enforce: bool) -> Arc<SessionHandler> {
        let registry = Arc::new(ConnectionRegistry::new(id("vishal")));
        let directory = StaticDirectory::new([id("vishal"), id("alice"), id("bob")]);
        Arc::new(SessionHandler::new(registry, Arc::new(directory), enforce))
    }

    fn open(h: &Arc<SessionHandler>, n: u64) -> (Session, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (h.open(ConnectionHandle::new(n, tx)), rx)
    }

    #[tokio::test]
    async fn state_machine() {
        let h = handler(false);
        let (mut s, _rx) = open(&h, 1);
        assert_eq!(s.state(), &SessionState::Unidentified);

        s.announce(id("alice")).await.unwrap();
        assert_eq!(s.identity(), Some(&id("alice")));

        s.disconnect().await;
        assert_eq!(s.state(), &SessionState::Closed);
        assert!(s.announce(id("alice")).await.is_err());
        assert!(h.registry().lookup(&id("alice")).await.is_none());
    }

    #[tokio::test]
    async fn unidentified_disconnect_is_noop() {
        let h = handler(false);
        let (mut alice, _rx) = open(&h, 1);
        alice.announce(id("alice")).await.unwrap();

        let (mut lurker, _rx2) = open(&h, 2);
        lurker.disconnect().await;
        assert_eq!(h.registry().count().await, 1);
    }

    #[tokio::test]
    async fn admin_gets_roster_then_presence() {
        let h = handler(false);
        let (mut alice, _arx) = open(&h, 1);
        alice.announce(id("alice")).await.unwrap();

        let (mut admin, mut rx) = open(&h, 2);
        admin.announce(id("vishal")).await.unwrap();

        let roster: BTreeSet<Identity> = [id("alice"), id("bob")].into_iter().collect();
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Roster { identities: roster });
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::PresenceUpdated {
                online: [id("alice")].into_iter().collect()
            }
        );
    }

    #[tokio::test]
    async fn participant_never_gets_roster() {
        let h = handler(false);
        let (mut alice, mut rx) = open(&h, 1);
        alice.announce(id("alice")).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn enforcement_rejects_unknown() {
        let h = handler(true);
        let (mut s, _rx) = open(&h, 1);
        let err = s.announce(id("mallory")).await.unwrap_err();
        assert!(matches!(err, RelayError::UnknownIdentity(_)));
        assert_eq!(s.state(), &SessionState::Unidentified);

        s.announce(id("bob")).await.unwrap();
        assert_eq!(s.identity(), Some(&id("bob")));
    }

    #[tokio::test]
    async fn superseded_tab_disconnect_keeps_new_tab() {
        let h = handler(false);
        let (mut tab1, _rx1) = open(&h, 1);
        let (mut tab2, _rx2) = open(&h, 2);
        tab1.announce(id("alice")).await.unwrap();
        tab2.announce(id("alice")).await.unwrap();

        tab1.disconnect().await;
        assert_eq!(
            h.registry().lookup(&id("alice")).await.map(|c| c.id()),
            Some(2)
        );
    }

    #[tokio::test]
    async fn identified_participant_cannot_send_as_admin() {
        let h = handler(false);
        let (mut admin, mut admin_rx) = open(&h, 1);
        admin.announce(id("vishal")).await.unwrap();
        while admin_rx.try_recv().is_ok() {}

        let (mut alice, _arx) = open(&h, 2);
        let (mut bob, mut bob_rx) = open(&h, 3);
        alice.announce(id("alice")).await.unwrap();
        bob.announce(id("bob")).await.unwrap();
        while admin_rx.try_recv().is_ok() {}

        let forged = PrivateMessage {
            from: id("vishal"),
            to: id("bob"),
            text: "spoof".into(),
        };
        let err = alice.send_message(forged).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidMessage(_)));
        assert!(bob_rx.try_recv().is_err());
        assert!(admin_rx.try_recv().is_err());

        // The announced identity still goes through, and only to the admin.
        let honest = PrivateMessage {
            from: id("alice"),
            to: id("bob"),
            text: "hi".into(),
        };
        assert_eq!(alice.send_message(honest.clone()).await.unwrap(), Delivery::Sent(1));
        assert_eq!(admin_rx.try_recv().unwrap(), ServerEvent::PrivateMessage(honest));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn admin_sends_as_itself() {
        let h = handler(false);
        let (mut admin, _admin_rx) = open(&h, 1);
        admin.announce(id("vishal")).await.unwrap();
        let (mut bob, mut bob_rx) = open(&h, 2);
        bob.announce(id("bob")).await.unwrap();

        let msg = PrivateMessage {
            from: id("vishal"),
            to: id("bob"),
            text: "hello".into(),
        };
        assert_eq!(admin.send_message(msg.clone()).await.unwrap(), Delivery::Sent(2));
        assert_eq!(bob_rx.try_recv().unwrap(), ServerEvent::PrivateMessage(msg));
    }

    #[tokio::test]
    async fn unidentified_sender_routes_by_claimed_origin() {
        let h = handler(false);
        let (mut admin, mut admin_rx) = open(&h, 1);
        admin.announce(id("vishal")).await.unwrap();
        while admin_rx.try_recv().is_ok() {}

        let (mut anon, _rx) = open(&h, 2);
        let msg = PrivateMessage {
            from: id("alice"),
            to: id("bob"),
            text: "hi".into(),
        };
        let delivery = anon.handle_event(ClientEvent::PrivateMessage(msg.clone())).await;
        assert!(delivery.is_ok());
        assert_eq!(admin_rx.try_recv().unwrap(), ServerEvent::PrivateMessage(msg));
    }
}
