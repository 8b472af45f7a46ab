//! Connection handler
//!
//! One task per accepted connection: reads, interprets the `exit`
//! directive, forwards everything else to the broadcaster, and releases the
//! connection when it is done.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::message::Inbound;
use crate::registry::{Peer, Registry};

/// Why a handler stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// Peer closed its side of the stream
    PeerClosed,
    /// Peer sent the `exit` directive
    ExitRequested,
    /// The connection was closed out from under the read (server stop)
    Closed,
    /// Any other read failure; the stream is considered broken
    ReadFailed,
}

/// Drive one connection until it ends, then clean it up
///
/// `peer` must already be registered. The read half stays here; the write
/// half lives in the registry entry so broadcasts from other handlers can
/// reach it.
pub async fn handle_connection<R>(
    mut reader: R,
    peer: Arc<Peer>,
    registry: Arc<Registry>,
    buffer_size: usize,
) -> HandlerExit
where
    R: AsyncRead + Unpin,
{
    let exit = read_loop(&mut reader, &peer, &registry, buffer_size).await;
    cleanup(&peer, &registry).await;
    exit
}

async fn read_loop<R>(
    reader: &mut R,
    peer: &Peer,
    registry: &Registry,
    buffer_size: usize,
) -> HandlerExit
where
    R: AsyncRead + Unpin,
{
    let mut recv = vec![0u8; buffer_size];

    loop {
        let read = tokio::select! {
            biased;
            _ = peer.closed().cancelled() => {
                debug!(peer = %peer.addr, "connection closed, ending handler");
                return HandlerExit::Closed;
            }
            read = reader.read(&mut recv) => read,
        };

        match read {
            Ok(0) => {
                info!("{} disconnected", peer.addr);
                return HandlerExit::PeerClosed;
            }
            Ok(n) => match Inbound::parse(&recv[..n]) {
                Inbound::Exit => {
                    info!("{} disconnected", peer.addr);
                    return HandlerExit::ExitRequested;
                }
                Inbound::Chat(payload) => {
                    broadcast(registry, peer.id, &peer.addr, payload).await;
                }
            },
            Err(e) => {
                warn!(peer = %peer.addr, error = %e, "reading msg failed");
                return HandlerExit::ReadFailed;
            }
        }
    }
}

/// Remove from the registry, then close
///
/// Both steps are idempotent, so racing a server stop is harmless.
async fn cleanup(peer: &Peer, registry: &Registry) {
    registry.remove(peer.id).await;
    peer.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    use crate::config::BUFFER_SIZE;
    use crate::types::ConnId;

    const WAIT: Duration = Duration::from_secs(2);

    /// Register an in-memory connection and spawn its handler
    async fn spawn_handler(
        registry: &Arc<Registry>,
        addr: &str,
    ) -> (Arc<Peer>, DuplexStream, JoinHandle<HandlerExit>) {
        let (server_side, client_side) = duplex(1024);
        let (reader, writer) = split(server_side);
        let peer = Arc::new(Peer::new(ConnId::new(), addr, writer, CancellationToken::new()));
        registry.add(peer.clone()).await;
        let task = tokio::spawn(handle_connection(
            reader,
            peer.clone(),
            registry.clone(),
            BUFFER_SIZE,
        ));
        (peer, client_side, task)
    }

    async fn read_text(stream: &mut DuplexStream) -> String {
        let mut buf = [0u8; 1024];
        let n = timeout(WAIT, stream.read(&mut buf)).await.unwrap().unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_message_is_relayed_to_all() {
        let registry = Arc::new(Registry::new());
        let (_a, mut alice, _ta) = spawn_handler(&registry, "10.0.0.1:1").await;
        let (_b, mut bob, _tb) = spawn_handler(&registry, "10.0.0.2:2").await;

        alice.write_all(b"hello").await.unwrap();

        assert_eq!(read_text(&mut alice).await, "me: hello");
        assert_eq!(read_text(&mut bob).await, "10.0.0.1:1: hello");
    }

    #[tokio::test]
    async fn test_exit_is_not_broadcast() {
        let registry = Arc::new(Registry::new());
        let (a, mut alice, task) = spawn_handler(&registry, "10.0.0.1:1").await;
        let (_b, mut bob, _tb) = spawn_handler(&registry, "10.0.0.2:2").await;

        alice.write_all(b"exit").await.unwrap();

        let exit = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(exit, HandlerExit::ExitRequested);
        assert!(!registry.contains(a.id).await);

        // Alice's stream is closed by cleanup
        let mut buf = [0u8; 16];
        assert_eq!(alice.read(&mut buf).await.unwrap(), 0);

        // Bob saw nothing: the next thing he reads is his own message
        bob.write_all(b"ping").await.unwrap();
        assert_eq!(read_text(&mut bob).await, "me: ping");
    }

    #[tokio::test]
    async fn test_peer_close_cleans_up() {
        let registry = Arc::new(Registry::new());
        let (a, alice, task) = spawn_handler(&registry, "10.0.0.1:1").await;

        drop(alice);

        let exit = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(exit, HandlerExit::PeerClosed);
        assert!(registry.is_empty().await);
        assert!(!a.is_live());
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let registry = Arc::new(Registry::new());
        let (a, _alice, task) = spawn_handler(&registry, "10.0.0.1:1").await;

        registry.close_all().await;

        let exit = timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(exit, HandlerExit::Closed);
        assert!(!registry.contains(a.id).await);
    }
}
