//! TCP event client.
//!
//! Speaks newline-delimited JSON to a device event service: one login
//! frame out, then a stream of event frames in.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use vto_core::{Device, ProtocolEvent};
use vto_protocol::{parse_event_frame, LoginFrame, MessageError};

use super::{Connection, SessionClient, SessionError};

/// Connect timeout applied by the client itself.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum event frame size (64 KB)
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Session client for devices reachable over TCP.
#[derive(Debug, Clone)]
pub struct TcpEventClient {
    connect_timeout: Duration,
}

impl Default for TcpEventClient {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpEventClient {
    /// Creates a client with a custom connect timeout.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SessionClient for TcpEventClient {
    async fn open(&self, device: &Device) -> Result<Box<dyn Connection>, SessionError> {
        let address = device.address();

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(SessionError::Connect { address, source }),
            Err(_) => {
                return Err(SessionError::ConnectTimeout {
                    address,
                    timeout: self.connect_timeout,
                })
            }
        };

        let (reader, writer) = stream.into_split();
        let mut connection = TcpConnection {
            reader: BufReader::new(reader),
            writer,
            address,
        };
        connection
            .send_login(&device.username, &device.password)
            .await?;

        debug!(device_id = %device.id, address = %connection.address, "Session opened");
        Ok(Box::new(connection))
    }
}

/// A logged-in TCP session.
pub struct TcpConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    address: String,
}

impl TcpConnection {
    async fn send_login(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        let frame = serde_json::to_string(&LoginFrame::new(username, password))
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one raw frame, bounded by `MAX_FRAME_SIZE`.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut frame = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_FRAME_SIZE as u64 + 1);
        let bytes_read = limited.read_until(b'\n', &mut frame).await?;

        if bytes_read == 0 {
            return Ok(None);
        }
        if frame.len() > MAX_FRAME_SIZE {
            return Err(SessionError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Some(frame))
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn next_event(&mut self) -> Result<Option<ProtocolEvent>, SessionError> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                return Ok(None);
            };
            let line = match String::from_utf8(frame) {
                Ok(line) => line,
                Err(e) => {
                    debug!(address = %self.address, error = %e, "Skipping non UTF-8 frame");
                    continue;
                }
            };

            match parse_event_frame(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(MessageError::Empty) => continue,
                Err(e) => {
                    // One unreadable frame does not end the session
                    debug!(address = %self.address, error = %e, "Skipping undecodable frame");
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(address = %self.address, error = %e, "Error closing session");
        }
    }
}
