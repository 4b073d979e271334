//! Mock transport for deterministic testing of codecs and the device session.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. Receivers also talk without being asked, so the
//! mock can queue unsolicited bytes, and it can inject open and write
//! failures to drive the reconnect paths.
//!
//! The transport is usually moved into an IO task. Keep a [`MockHandle`]
//! (from [`MockTransport::handle`]) to inspect and steer it afterwards.
//!
//! # Example
//!
//! ```
//! use rotel_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the session sends this request, the device answers with this.
//! mock.expect(b"power?", b"power=on$");
//! let handle = mock.handle();
//! handle.push_inbound(b"volume=45$");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use rotel_core::error::{Error, Result};
use rotel_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Accept sends that match no expectation instead of failing them.
    lenient: bool,
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
    open_count: usize,
    close_count: usize,
    open_failures: VecDeque<Error>,
    send_failures: VecDeque<Error>,
}

/// A mock [`Transport`] for testing without hardware.
///
/// In strict mode (the default) every `send()` must match the next
/// expectation, otherwise it fails with [`Error::Protocol`]. A lenient mock
/// ([`MockTransport::lenient`]) records every send and only answers the ones
/// that match.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    data_ready: Arc<Notify>,
}

/// Shared handle to a [`MockTransport`] that has been moved elsewhere.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    data_ready: Arc<Notify>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a new strict mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
            data_ready: Arc::new(Notify::new()),
        }
    }

    /// Create a lenient mock that accepts any send.
    pub fn lenient() -> Self {
        let mock = Self::new();
        lock(&mock.state).lenient = true;
        mock
    }

    /// Create a mock in the closed state, as a transport built from
    /// configuration starts out before the first `open()`.
    pub fn closed() -> Self {
        let mock = Self::lenient();
        lock(&mock.state).connected = false;
        mock
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, `response` is
    /// queued for the following `receive()` calls.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// A handle that stays usable after the transport is moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
            data_ready: Arc::clone(&self.data_ready),
        }
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Set the connected state.
    ///
    /// When `false`, `send()` and `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        lock(&self.state).connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queue bytes the device sends without being asked.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.state).inbound.extend(data.iter().copied());
        self.data_ready.notify_one();
    }

    /// Add an expected request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// All data sent so far, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Sent data decoded as UTF-8 (lossy), convenient for ASCII dialects.
    pub fn sent_text(&self) -> Vec<String> {
        lock(&self.state)
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }

    /// Forget the sent log.
    pub fn clear_sent(&self) {
        lock(&self.state).sent_log.clear();
    }

    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Simulate the link dropping (or coming back without an `open()`).
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
        self.data_ready.notify_one();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Make the next `open()` fail with `err`. Failures queue up.
    pub fn fail_next_open(&self, err: Error) {
        lock(&self.state).open_failures.push_back(err);
    }

    /// Make the next `send()` fail with `err`. Failures queue up.
    pub fn fail_next_send(&self, err: Error) {
        lock(&self.state).send_failures.push_back(err);
    }

    /// Number of `open()` calls, successful or not.
    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.open_count += 1;
        if let Some(err) = state.open_failures.pop_front() {
            return Err(err);
        }
        state.connected = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }

        state.sent_log.push(data.to_vec());

        let matches_next = state
            .expectations
            .front()
            .is_some_and(|e| e.request.as_slice() == data);
        if matches_next {
            if let Some(expectation) = state.expectations.pop_front() {
                state.inbound.extend(expectation.response);
                drop(state);
                self.data_ready.notify_one();
            }
            return Ok(());
        }

        if state.lenient {
            return Ok(());
        }
        match state.expectations.pop_front() {
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            ))),
            None => Err(Error::Protocol("no more expectations in mock transport".into())),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.data_ready.notified();
            {
                let mut state = lock(&self.state);
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if !state.inbound.is_empty() {
                    let n = state.inbound.len().min(buf.len());
                    for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.close_count += 1;
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}
