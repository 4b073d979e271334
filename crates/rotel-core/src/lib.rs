//! rotel-core: Core traits, types, and error definitions for rotel-rs.
//!
//! This crate defines the dialect-agnostic abstractions shared by every
//! rotel-rs crate. Integration layers depend on these types without pulling
//! in a transport or the device session.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`DeviceModel`] -- static capability descriptor of a receiver model
//! - [`LogicalCommand`] / [`CommandTable`] -- dialect-independent commands
//!   and their native encodings
//! - [`FeedbackEvent`] / [`DeviceEvent`] -- decoded feedback and state
//!   change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod command;
pub mod error;
pub mod events;
pub mod model;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use rotel_core::*`.
pub use command::{CommandTable, LogicalCommand, NativeToken, ValueFormat};
pub use error::{Error, Result};
pub use events::{Attribute, DeviceEvent, FeedbackEvent, StateValue};
pub use model::{
    DeviceModel, FlagBit, HexFlags, HexLayout, LevelRange, Quirk, SourceEntry, ZoneSelectCommand,
};
pub use transport::Transport;
pub use types::*;
