//! Relay server lifecycle
//!
//! `Server` owns the listener and runs the accept loop. `ServerHandle` is
//! the cloneable side used to register connections and to stop the relay.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::handler::handle_connection;
use crate::registry::{Peer, Registry};
use crate::types::ConnId;

/// Bound relay, ready to accept
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    handle: ServerHandle,
}

impl Server {
    /// Bind and listen on the configured address
    pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let addr = config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            handle: ServerHandle::new(config.buffer_size),
        })
    }

    /// Actual bound address (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept connections until stopped
    ///
    /// Returns `Ok(())` after a stop, or the accept error that ended the
    /// loop. The listener is closed when this returns.
    pub async fn run(self) -> Result<(), RelayError> {
        let Server {
            listener,
            local_addr,
            handle,
        } = self;
        let shutdown = handle.shared.shutdown.clone();

        info!("relay listening on {}", local_addr);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted.map_err(RelayError::Accept)?;
                    handle.serve_connection(stream, peer_addr.to_string()).await;
                }
            }
        }

        drop(listener);
        debug!("listener on {} closed", local_addr);
        Ok(())
    }
}

/// Cloneable control handle for a running relay
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    stopping: AtomicBool,
    buffer_size: usize,
}

impl ServerHandle {
    /// Handle with an empty registry and no listener attached
    pub fn new(buffer_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Arc::new(Registry::new()),
                shutdown: CancellationToken::new(),
                stopping: AtomicBool::new(false),
                buffer_size,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Register a stream and spawn its handler
    ///
    /// Works for any byte stream, so tests can feed in-memory pipes. A
    /// connection registered after a stop starts out closed.
    pub async fn serve_connection<S>(&self, stream: S, addr: String) -> ConnId
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = split(stream);
        let closed = self.shared.shutdown.child_token();
        let peer = Arc::new(Peer::new(ConnId::new(), addr, writer, closed));
        let id = peer.id;

        self.shared.registry.add(peer.clone()).await;
        info!("{} connected", peer.addr);

        tokio::spawn(handle_connection(
            reader,
            peer,
            self.shared.registry.clone(),
            self.shared.buffer_size,
        ));

        id
    }

    /// Stop the relay
    ///
    /// Signals the accept loop, then closes every registered connection
    /// under the registry write lock. Handlers remove themselves as their
    /// reads return; this does not wait for them. Only the first call acts
    /// and returns `true`.
    pub async fn stop(&self) -> bool {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.shared.shutdown.cancel();
        let closed = self.shared.registry.close_all().await;
        debug!("closed {} connections", closed);

        info!("server down");
        true
    }
}
