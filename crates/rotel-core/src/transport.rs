//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a receiver.
//! Implementations exist for serial ports and TCP sockets (`rotel-transport`),
//! a device simulator (`rotel-device`) and a scripted mock for tests
//! (`rotel-test-harness`).
//!
//! A transport is long-lived: the reconnect supervisor closes and reopens the
//! same instance, so [`Transport::open`] must be callable again after
//! [`Transport::close`].

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open (or reopen) the underlying connection.
    ///
    /// Calling `open()` on an already-open transport is a no-op.
    async fn open(&mut self) -> Result<()>;

    /// Send raw bytes to the device.
    ///
    /// Blocks until all bytes have been handed to the OS.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the connection.
    ///
    /// Must be idempotent: closing a closed transport returns `Ok(())`.
    /// After `close()`, [`is_connected`](Transport::is_connected) is false and
    /// `send()`/`receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
