//! Connection handler for individual control clients.
//!
//! Each accepted socket gets its own `ConnectionHandler` that splits the
//! byte stream into newline-delimited messages and queues them for the
//! control channel. A final message without a trailing newline is still
//! delivered when the client closes its side.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Reads control messages from one client.
pub struct ConnectionHandler<R> {
    reader: BufReader<R>,
    peer: SocketAddr,
    queue: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl<R: AsyncRead + Unpin> ConnectionHandler<R> {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read side of the client stream
    /// * `peer` - Client address, for logs
    /// * `queue` - Where complete messages are sent
    /// * `cancel` - Server shutdown token
    pub fn new(
        reader: R,
        peer: SocketAddr,
        queue: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            peer,
            queue,
            cancel,
        }
    }

    /// Forwards messages until the client disconnects, the server shuts
    /// down, or an error ends the connection. Returns the number of
    /// messages forwarded.
    pub async fn run(mut self) -> usize {
        debug!(peer = %self.peer, "Control client connected");
        let mut forwarded = 0;

        loop {
            let cancel = self.cancel.clone();
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.read_message() => result,
            };

            let message = match next {
                Ok(message) => message,
                Err(ConnectionError::Eof) => break,
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "Dropping control connection");
                    break;
                }
            };

            if message.trim().is_empty() {
                continue;
            }
            if self.queue.send(message).await.is_err() {
                debug!(peer = %self.peer, "Control queue closed");
                break;
            }
            forwarded += 1;
        }

        debug!(peer = %self.peer, forwarded, "Control client disconnected");
        forwarded
    }

    /// Reads one message, without its line terminator.
    async fn read_message(&mut self) -> Result<String, ConnectionError> {
        let mut buf = Vec::new();
        let limit = (MAX_MESSAGE_SIZE + 1) as u64;

        let bytes_read = timeout(
            READ_TIMEOUT,
            (&mut self.reader).take(limit).read_until(b'\n', &mut buf),
        )
        .await
        .map_err(|_| ConnectionError::Timeout)?
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }

        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        // Undecodable bytes are left for the message parser to reject.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}
