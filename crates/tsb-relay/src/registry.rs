use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifier handed out to each accepted client.
pub type ConnectionId = u64;

struct Client {
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct Registry {
    next_id: ConnectionId,
    clients: BTreeMap<ConnectionId, Client>,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Clients whose queue was full.
    pub dropped: usize,
    /// Clients found closed and deregistered.
    pub removed: usize,
}

/// Live relay clients. Clones share the same set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, peer: SocketAddr, tx: mpsc::Sender<Bytes>) -> ConnectionId {
        let mut reg = self.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.clients.insert(id, Client { peer, tx });
        id
    }

    /// Remove a client. Returns false if it was already gone.
    pub(crate) fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self.lock().clients.remove(&id);
        if let Some(client) = &removed {
            tracing::info!(id, peer = %client.peer, "client deregistered");
        }
        removed.is_some()
    }

    /// Offer `packet` to every client without waiting.
    pub(crate) fn broadcast(&self, packet: &Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut reg = self.lock();
        reg.clients.retain(|id, client| match client.tx.try_send(packet.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                tracing::warn!(id, peer = %client.peer, "client queue full, frame dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.removed += 1;
                tracing::info!(id, peer = %client.peer, "client gone, deregistered");
                false
            }
        });
        report
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().clients.is_empty()
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.lock().clients.keys().copied().collect()
    }

    /// Registered peers with their ids.
    pub fn peers(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.lock()
            .clients
            .iter()
            .map(|(id, c)| (*id, c.peer))
            .collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
