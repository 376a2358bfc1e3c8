//! TCP control socket server.
//!
//! The server:
//! - Listens on the configured host/port for control clients
//! - Spawns a ConnectionHandler for each client
//! - Feeds every received message into one queue, consumed in order by
//!   the control channel
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ControlServer  │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐   mpsc<String>   ┌─────────────────┐
//! │ConnectionHandler│─────────────────▶│ ControlChannel  │
//! │   (per client)  │                  │                 │
//! └─────────────────┘                  └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, MAX_MESSAGE_SIZE, READ_TIMEOUT};

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Capacity of the queue between connections and the control channel.
pub const QUEUE_CAPACITY: usize = 64;

/// Control socket server.
pub struct ControlServer {
    listener: TcpListener,
    queue: mpsc::Sender<String>,
    cancel_token: CancellationToken,
}

impl ControlServer {
    /// Binds the control socket.
    ///
    /// # Arguments
    ///
    /// * `addr` - `host:port` to listen on
    /// * `queue` - Where received messages are sent
    /// * `cancel_token` - Token for graceful shutdown
    ///
    /// # Errors
    ///
    /// `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: &str,
        queue: mpsc::Sender<String>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            queue,
            cancel_token,
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the cancellation token is triggered.
    ///
    /// Dropping the server (on return) drops its queue sender, so the
    /// queue closes once every connection handler has finished too.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "Control server listening"),
            Err(_) => info!("Control server listening"),
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Control server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            // Nothing is ever written back to control clients.
                            let (reader, _writer) = stream.into_split();
                            let handler = ConnectionHandler::new(
                                reader,
                                peer,
                                self.queue.clone(),
                                self.cancel_token.clone(),
                            );
                            tokio::spawn(handler.run());
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind control socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
