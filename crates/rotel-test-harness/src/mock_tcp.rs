//! Mock TCP server for transport-level testing.
//!
//! [`MockTcpServer`] is a localhost TCP listener pre-loaded with scripted
//! exchanges, standing in for an IP-controlled receiver or a
//! serial-to-Ethernet adapter.
//!
//! # Example
//!
//! ```
//! use rotel_test_harness::MockTcpServer;
//!
//! # async fn example() -> rotel_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // When the client sends "power?", answer "power=on$".
//! server.expect(b"power?", b"power=on$");
//! server.start();
//!
//! let addr = server.addr().to_string();
//! // ... connect a TcpTransport to addr and test ...
//! # Ok(())
//! # }
//! ```

use rotel_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One scripted step of the server.
#[derive(Debug, Clone)]
enum Step {
    /// Read exactly `request`, then write `response`.
    Exchange { request: Vec<u8>, response: Vec<u8> },
    /// Write bytes without waiting for a request.
    Unsolicited(Vec<u8>),
    /// Close the connection.
    Hangup,
}

/// A mock TCP server accepting a single client connection.
///
/// Steps run in order once [`start`](MockTcpServer::start) is called. A
/// mismatching request ends the script with an error reported by
/// [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    steps: VecDeque<Step>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Create a new mock TCP server listening on a random localhost port.
    ///
    /// The listener is bound immediately, so clients may connect before or
    /// after [`start`](MockTcpServer::start).
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        Ok(Self {
            addr,
            listener: Some(listener),
            steps: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.steps.push_back(Step::Exchange {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Send bytes to the client unprompted at this point of the script.
    pub fn push(&mut self, data: &[u8]) {
        self.steps.push_back(Step::Unsolicited(data.to_vec()));
    }

    /// Drop the connection at this point of the script.
    pub fn hangup(&mut self) {
        self.steps.push_back(Step::Hangup);
    }

    /// The `host:port` the server listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The port the server listens on.
    pub fn port(&self) -> u16 {
        self.addr
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(0)
    }

    /// Start serving the script in a background task.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let steps: Vec<Step> = self.steps.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;

            for (i, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Exchange { request, response } => {
                        let mut buf = vec![0u8; request.len()];
                        let mut total_read = 0;
                        while total_read < request.len() {
                            let n = stream
                                .read(&mut buf[total_read..])
                                .await
                                .map_err(|e| format!("step {}: read error: {}", i, e))?;
                            if n == 0 {
                                return Err(format!(
                                    "step {}: client disconnected after {} bytes (expected {})",
                                    i,
                                    total_read,
                                    request.len()
                                ));
                            }
                            total_read += n;
                        }
                        if buf != request {
                            return Err(format!(
                                "step {}: request mismatch: expected {:02X?}, got {:02X?}",
                                i, request, buf
                            ));
                        }
                        stream
                            .write_all(&response)
                            .await
                            .map_err(|e| format!("step {}: write error: {}", i, e))?;
                    }
                    Step::Unsolicited(data) => {
                        stream
                            .write_all(&data)
                            .await
                            .map_err(|e| format!("step {}: write error: {}", i, e))?;
                    }
                    Step::Hangup => return Ok(()),
                }
                stream
                    .flush()
                    .await
                    .map_err(|e| format!("step {}: flush error: {}", i, e))?;
            }

            // Hold the connection open until the client goes away.
            let mut sink = [0u8; 64];
            while let Ok(n) = stream.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the script to finish and return any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}
