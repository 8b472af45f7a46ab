//! Minimal TCP Broadcast Relay
//!
//! A server that rebroadcasts every message it receives to all connected
//! clients, and an interactive client that talks to it.
//!
//! # Wire format
//! - No framing: the bytes of one read are one message
//! - Relayed messages are `label + ": " + payload`, where the label is `me`
//!   for the sender's own copy and the sender's remote address otherwise
//! - A message equal to `exit` disconnects the sender and is not relayed
//!
//! # Architecture
//! - `Registry` is the only shared state on the server, behind an async
//!   `RwLock`: broadcasts share it, add/remove take it exclusively
//! - Each accepted connection gets a handler task and a child
//!   `CancellationToken` of the server's token
//! - The client runs capture/send/receive tasks over one token and an
//!   unbounded queue
//!
//! # Example
//! ```ignore
//! use broadcast_relay::{RelayConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), broadcast_relay::RelayError> {
//!     let server = Server::bind(&RelayConfig::default()).await?;
//!     let handle = server.handle();
//!
//!     tokio::spawn(server.run());
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{broadcast, Delivery};
pub use client::{Client, ConnStatus};
pub use config::{RelayConfig, BUFFER_SIZE, DEFAULT_PORT, SHUTDOWN_GRACE};
pub use console::Console;
pub use error::{RelayError, SendError};
pub use handler::{handle_connection, HandlerExit};
pub use message::{Inbound, SenderLabel};
pub use registry::{Peer, Registry};
pub use server::{Server, ServerHandle};
pub use types::ConnId;
