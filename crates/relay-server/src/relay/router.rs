//! Message router: picks the single destination for a private message.
//!
//! The admin may address anyone; everyone else can only reach the admin,
//! whatever they put in `to`. A destination that isn't connected means the
//! message is dropped without telling the sender.

use super::registry::{ConnectionRegistry, Delivery};
use relay_core::{Identity, PrivateMessage, ServerEvent};
use std::sync::Arc;
use tracing::{debug, trace};

/// Routes private messages between the admin and participants.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    /// Create a router backed by a connection registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Identity the message will be delivered to.
    pub fn destination<'a>(&'a self, message: &'a PrivateMessage) -> &'a Identity {
        if self.registry.is_admin(&message.from) {
            &message.to
        } else {
            self.registry.admin()
        }
    }

    /// Deliver `message` to its destination, if connected.
    pub async fn route(&self, message: PrivateMessage) -> Delivery {
        let target = self.destination(&message).clone();
        let from = message.from.clone();

        let outcome = self
            .registry
            .deliver(&target, ServerEvent::PrivateMessage(message))
            .await;

        match outcome {
            Delivery::Sent(conn_id) => {
                debug!(from = %from, to = %target, conn_id, "message routed");
            }
            Delivery::Dropped(conn_id) => {
                debug!(from = %from, to = %target, conn_id, "message not queued");
            }
            Delivery::Unreachable => {
                trace!(from = %from, to = %target, "recipient offline, message dropped");
            }
        }
        outcome
    }
}
