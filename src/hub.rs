use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{
    engine::Outbox,
    lock,
    protocol::{ConnId, ServerEvent},
};

/// Outbound channel of every open socket.
///
/// Sending never waits: an event that doesn't fit in the peer's buffer is
/// dropped and logged.
#[derive(Clone, Default)]
pub struct Hub {
    peers: Arc<Mutex<HashMap<ConnId, mpsc::Sender<ServerEvent>>>>,
}

impl Hub {
    pub fn register(&self, handle: ConnId, outbound: mpsc::Sender<ServerEvent>) {
        lock(&self.peers).insert(handle, outbound);
    }

    pub fn unregister(&self, handle: ConnId) -> bool {
        lock(&self.peers).remove(&handle).is_some()
    }

    pub fn send(&self, handle: ConnId, event: ServerEvent) -> bool {
        let peers = lock(&self.peers);
        let Some(outbound) = peers.get(&handle) else {
            debug!(%handle, "no socket for connection, dropping event");
            return false;
        };

        match outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%handle, "outbound buffer full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%handle, "socket already closed, dropping event");
                false
            }
        }
    }

    pub fn deliver(&self, outbox: Outbox) {
        for (handle, event) in outbox {
            self.send(handle, event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.peers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
