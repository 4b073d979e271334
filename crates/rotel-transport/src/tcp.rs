//! TCP transport for receiver communication.
//!
//! This module provides [`TcpTransport`], which implements the [`Transport`]
//! trait for receivers reached over a raw TCP socket: network-enabled
//! models with an IP control port, or an RS-232 to Ethernet adapter in
//! raw (not RFC 2217) mode.
//!
//! # Example
//!
//! ```no_run
//! use rotel_transport::TcpTransport;
//! use rotel_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rotel_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:9590").await?;
//!
//! transport.send(b"power?").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rotel_core::error::{Error, Result};
use rotel_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport.
///
/// Created unopened with [`new`](TcpTransport::new) (the reconnect
/// supervisor opens it) or eagerly with [`connect`](TcpTransport::connect).
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` while closed.
    stream: Option<TcpStream>,
    /// `host:port`, used for connecting and logging.
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create an unopened transport for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            stream: None,
            addr: format!("{host}:{port}"),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Connect to a `host:port` endpoint using the default timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a `host:port` endpoint with a specified timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let mut transport = Self {
            stream: None,
            addr: addr.to_string(),
            connect_timeout: timeout,
        };
        Transport::open(&mut transport).await?;
        Ok(transport)
    }

    /// Wrap an already-connected `TcpStream`.
    ///
    /// Reopening after a close connects again to `addr`.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Get the `host:port` string of this transport.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let target = tokio::net::lookup_host(self.addr.as_str())
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                tracing::error!(addr = %self.addr, "Cannot resolve address");
                Error::Config(format!("cannot resolve address {}", self.addr))
            })?;

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        // Commands are a few bytes each and the display cycling sequences
        // depend on them leaving promptly.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr = %self.addr, error = %e, "Failed to set TCP_NODELAY (continuing anyway)");
        }

        tracing::info!(addr = %self.addr, "TCP connection established");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(addr = %self.addr, bytes = ?data, "Sending data");

        let result = match stream.write_all(data).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!(addr = %self.addr, error = %e, "Failed to send data");
            let err = map_io_error(e);
            if matches!(err, Error::ConnectionLost) {
                self.stream = None;
            }
            return Err(err);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                // The peer closed the connection.
                tracing::warn!(addr = %self.addr, "Peer closed connection (0 bytes read)");
                self.stream = None;
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(addr = %self.addr, bytes = ?&buf[..n], "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "Failed to receive data");
                let err = map_io_error(e);
                if matches!(err, Error::ConnectionLost) {
                    self.stream = None;
                }
                Err(err)
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
