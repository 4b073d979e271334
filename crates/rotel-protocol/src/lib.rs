//! Wire codecs and the IO task for Rotel receivers.
//!
//! Rotel devices speak one of three dialects: a fixed-frame HEX protocol
//! whose feedback is a snapshot of the front-panel display, and two
//! generations of an ASCII `key=value` protocol. This crate hides the
//! difference behind [`WireCodec`] and runs the transport in a single IO
//! task that turns the device's byte stream into [`FeedbackEvent`]s.
//!
//! # Architecture
//!
//! - [`codec`] -- the [`WireCodec`] trait and [`codec_for`]
//! - [`hex`] -- HEX framing, checksum and validation
//! - [`hex_text`] -- HEX display-text interpretation
//! - [`ascii`] -- ASCII V1/V2 framing
//! - [`keys`] -- the feedback key vocabulary
//! - [`io`] -- IO task types, spawn, and the select loop
//!
//! [`FeedbackEvent`]: rotel_core::FeedbackEvent

pub mod ascii;
pub mod codec;
pub mod hex;
pub mod hex_text;
pub mod io;
pub mod keys;

pub use ascii::AsciiCodec;
pub use codec::{WireCodec, codec_for};
pub use hex::HexCodec;
pub use io::{DeviceIo, Inbound, spawn_io_task};
