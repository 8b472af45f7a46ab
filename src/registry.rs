//! Connection registry
//!
//! The server's only shared mutable structure: every accepted connection
//! that may still be written to. Mutations take the write lock; broadcasts
//! iterate under the read lock so several handlers can fan out at once.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::ConnId;

/// Write half of a connection, type-erased so TCP and in-memory streams mix
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A registered connection
///
/// Holds the remote identity, the write half, and the token that tells the
/// owning handler to stop reading. The read half lives in the handler.
pub struct Peer {
    /// Registry key
    pub id: ConnId,
    /// Remote address, used as the sender label for other targets
    pub addr: String,
    /// `None` once the connection has been closed
    writer: Mutex<Option<BoxedWriter>>,
    /// Cancelled when the connection is closed
    closed: CancellationToken,
}

impl Peer {
    /// Wrap a write half; `closed` is usually a child of the server token
    pub fn new<W>(
        id: ConnId,
        addr: impl Into<String>,
        writer: W,
        closed: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            addr: addr.into(),
            writer: Mutex::new(Some(Box::new(writer))),
            closed,
        }
    }

    /// A connection is live until it has been closed
    pub fn is_live(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Token the handler watches while blocked on a read
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Write the whole buffer
    ///
    /// A zero-length write surfaces as `WriteZero`, so a short write is an
    /// error like any other.
    pub async fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection already closed",
            ));
        };
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Close the connection
    ///
    /// Cancels the handler's token and shuts the write half down. Returns
    /// `true` only for the call that actually released the writer.
    pub async fn close(&self) -> bool {
        self.closed.cancel();
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    debug!(peer = %self.addr, error = %e, "shutdown after close failed");
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Set of live connections keyed by `ConnId`
#[derive(Debug, Default)]
pub struct Registry {
    peers: RwLock<HashMap<ConnId, Arc<Peer>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert if absent; returns `false` when the id was already registered
    pub async fn add(&self, peer: Arc<Peer>) -> bool {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&peer.id) {
            return false;
        }
        peers.insert(peer.id, peer);
        true
    }

    /// Delete if present; removing an absent id is a no-op
    pub async fn remove(&self, id: ConnId) -> Option<Arc<Peer>> {
        self.peers.write().await.remove(&id)
    }

    /// Read-locked view over the live connections
    ///
    /// Writers (`add`, `remove`, `close_all`) wait until every view is
    /// dropped, so whoever holds one must not block indefinitely.
    pub async fn live(&self) -> LiveView<'_> {
        LiveView {
            peers: self.peers.read().await,
        }
    }

    /// Close every live connection under the write lock
    ///
    /// Entries stay in place; each handler removes its own entry once its
    /// blocked read returns.
    pub async fn close_all(&self) -> usize {
        let peers = self.peers.write().await;
        let mut closed = 0;
        for peer in peers.values().filter(|p| p.is_live()) {
            if peer.close().await {
                closed += 1;
            }
        }
        closed
    }

    pub async fn contains(&self, id: ConnId) -> bool {
        self.peers.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

/// Shared-lock snapshot of the registry
pub struct LiveView<'a> {
    peers: RwLockReadGuard<'a, HashMap<ConnId, Arc<Peer>>>,
}

impl LiveView<'_> {
    /// Live connections, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Peer>> {
        self.peers.values().filter(|p| p.is_live())
    }
}
