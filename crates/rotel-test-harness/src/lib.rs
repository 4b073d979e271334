//! rotel-test-harness: Test utilities and mock transports for rotel-rs.
//!
//! This crate provides [`MockTransport`] for deterministic testing of codecs,
//! the IO task and the device session without a receiver attached, and
//! [`MockTcpServer`] for testing the TCP transport against a scripted peer.

pub mod mock_serial;
pub mod mock_tcp;

pub use mock_serial::{MockHandle, MockTransport};
pub use mock_tcp::MockTcpServer;
