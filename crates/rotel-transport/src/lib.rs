//! Transport implementations for rotel-rs.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](rotel_core::Transport) trait from `rotel-core`:
//!
//! - [`SerialTransport`]: RS-232 connections, usually through a USB adapter
//! - [`TcpTransport`]: raw TCP connections to IP-enabled receivers or
//!   serial-to-Ethernet adapters
//!
//! Both transports can be created unopened and opened later, and can be
//! closed and reopened any number of times; the reconnect supervisor in
//! `rotel-device` relies on this.

pub mod serial;
pub mod tcp;

pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpTransport;
