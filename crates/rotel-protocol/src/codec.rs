//! The [`WireCodec`] trait shared by the three dialects.

use std::sync::Arc;

use rotel_core::command::LogicalCommand;
use rotel_core::error::Result;
use rotel_core::events::FeedbackEvent;
use rotel_core::model::DeviceModel;
use rotel_core::types::{Dialect, Zone};

use crate::ascii::AsciiCodec;
use crate::hex::HexCodec;

/// Encoder/decoder for one wire dialect of one device model.
///
/// Encoding is stateless. Decoding is incremental: bytes may arrive in any
/// chunking and partial frames are buffered until complete.
pub trait WireCodec: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Build the outbound frame for `cmd` in `zone`.
    ///
    /// Returns [`Error::Unsupported`](rotel_core::Error::Unsupported) when the
    /// model has no native token for the command, which callers treat as a
    /// silent no-op.
    fn encode(&self, zone: Zone, cmd: LogicalCommand, value: Option<i32>) -> Result<Vec<u8>>;

    /// Feed received bytes and collect every complete feedback event.
    fn decode(&mut self, data: &[u8]) -> Vec<FeedbackEvent>;

    /// Drop any partially received frame.
    fn reset(&mut self);

    /// Whether the stream has stopped producing valid frames altogether.
    fn framing_failed(&self) -> bool {
        false
    }
}

/// Create the codec for `dialect`.
pub fn codec_for(dialect: Dialect, model: Arc<DeviceModel>) -> Box<dyn WireCodec> {
    match dialect {
        Dialect::Hex => Box::new(HexCodec::new(model)),
        Dialect::AsciiV1 | Dialect::AsciiV2 => Box::new(AsciiCodec::new(dialect, model)),
    }
}
