//! Interactive relay client
//!
//! Three loops share one cancellation token:
//! - input capture: lines from the local input, queued for sending
//! - send: drains the queue onto the connection
//! - receive: prints whatever the relay sends, reports a server-side close
//!
//! `Client::stop` is the only place that closes the connection and the
//! queue, and it acts once.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{
    split, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::console::Console;
use crate::error::{RelayError, SendError};
use crate::registry::BoxedWriter;

/// Fires once when the relay closes the connection
pub type ConnStatus = oneshot::Receiver<()>;

/// Running client
pub struct Client {
    shutdown: CancellationToken,
    stopping: AtomicBool,
    /// Write half; `None` once closed
    writer: Mutex<Option<BoxedWriter>>,
    /// Producer side of the outbound queue; `None` once closed
    outbox: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    console: Console,
}

impl Client {
    /// Dial the relay and start the three loops
    pub async fn connect<I>(
        config: &RelayConfig,
        input: I,
        console: Console,
    ) -> Result<(Arc<Self>, ConnStatus), RelayError>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
    {
        config.validate()?;
        let addr = config.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| RelayError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!("connected to {}", addr);

        Ok(Self::start(stream, input, console, config.buffer_size))
    }

    /// Start the loops over any byte stream
    pub fn start<S, I>(
        stream: S,
        input: I,
        console: Console,
        buffer_size: usize,
    ) -> (Arc<Self>, ConnStatus)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        I: AsyncBufRead + Unpin + Send + 'static,
    {
        let (reader, writer) = split(stream);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = oneshot::channel();

        let client = Arc::new(Self {
            shutdown: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            writer: Mutex::new(Some(Box::new(writer))),
            outbox: std::sync::Mutex::new(Some(msg_tx)),
            console,
        });

        tokio::spawn(client.clone().capture_input(input));
        tokio::spawn(client.clone().send_loop(msg_rx));
        tokio::spawn(client.clone().recv_loop(reader, status_tx, buffer_size));

        (client, status_rx)
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queue one line for the sender
    ///
    /// Never blocks; fails once the client has been stopped.
    pub fn enqueue(&self, msg: Vec<u8>) -> Result<(), SendError> {
        let outbox = self.outbox.lock().unwrap_or_else(|e| e.into_inner());
        match outbox.as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| SendError::ChannelClosed),
            None => Err(SendError::ChannelClosed),
        }
    }

    /// Stop the client
    ///
    /// Cancels the loops, closes the connection, then closes the queue.
    /// Only the first call acts and returns `true`.
    pub async fn stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }

        // The sender drops any in-flight write (and the writer lock) on cancel
        self.shutdown.cancel();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "connection shutdown failed");
            }
        }

        self.outbox.lock().unwrap_or_else(|e| e.into_inner()).take();

        self.report("client down").await;
        true
    }

    async fn capture_input<I>(self: Arc<Self>, mut input: I)
    where
        I: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                read = input.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("input closed");
                    return;
                }
                Ok(_) => {
                    let msg = trim_line_ending(&line);
                    if msg.is_empty() {
                        continue;
                    }
                    if self.enqueue(msg.to_vec()).is_err() {
                        return;
                    }
                    if let Err(e) = self.console.redraw_prompt().await {
                        debug!(error = %e, "console write failed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read input");
                }
            }
        }
    }

    async fn send_loop(self: Arc<Self>, mut msg_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                msg = msg_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => return,
                },
            };

            // A peer that stops reading must not pin the writer past a stop
            let sent = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                sent = self.write(&msg) => sent,
            };

            if let Err(e) = sent {
                self.report(&format!("failed to send msg: {e}")).await;
            }
        }
    }

    async fn write(&self, bytes: &[u8]) -> io::Result<()> {
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

    async fn recv_loop<R>(
        self: Arc<Self>,
        mut reader: R,
        status: oneshot::Sender<()>,
        buffer_size: usize,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut recv = vec![0u8; buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                read = reader.read(&mut recv) => read,
            };

            match read {
                Ok(0) => {
                    self.report("disconnected from the server").await;
                    let _ = status.send(());
                    return;
                }
                Ok(n) => {
                    if let Err(e) = self.console.show_message(&recv[..n]).await {
                        debug!(error = %e, "console write failed");
                    }
                }
                Err(e) => {
                    self.report(&format!("failed to read msg from server: {e}")).await;
                }
            }
        }
    }

    /// Print a status line; a broken console is only logged
    async fn report(&self, text: &str) {
        if let Err(e) = self.console.line(text).await {
            debug!(error = %e, "console write failed");
        }
    }
}

/// Strip one trailing `\n` or `\r\n`
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
