//! Terminal output for the interactive client
//!
//! Cosmetic only: clears the current line before a received message and
//! redraws the `> ` prompt after each entered line.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Input prompt
pub const PROMPT: &str = "> ";

/// Move up over the echoed input line, clear it, reprint the prompt
pub const REDRAW_PROMPT: &str = "\x1b[1A\x1b[2K> ";

/// Clear the current line and return to column 0
pub const CLEAR_LINE: &str = "\x1b[2K\r";

/// Shared, cloneable output stream
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl Console {
    pub fn new<W>(out: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Write text as-is and flush
    pub async fn print(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await
    }

    /// Write one status line
    pub async fn line(&self, text: &str) -> io::Result<()> {
        self.print(&format!("{text}\n")).await
    }

    /// Show a relayed message above a fresh prompt
    pub async fn show_message(&self, msg: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(msg);
        self.print(&format!("{CLEAR_LINE}{text}\n{PROMPT}")).await
    }

    pub async fn redraw_prompt(&self) -> io::Result<()> {
        self.print(REDRAW_PROMPT).await
    }
}
