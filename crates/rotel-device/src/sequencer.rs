//! Command sequencer.
//!
//! Every outbound write goes through one [`Sequencer`] per device. A caller
//! takes the ordering lock with [`Sequencer::begin`] and holds the returned
//! [`Sequence`] for the whole of a multi-step exchange (send, pause, send),
//! so sequences from external callers, follow-ups and priming jobs never
//! interleave. The lock is a `tokio::sync::Mutex`, which is FIFO-fair.
//!
//! The encoder lives inside the lock: nothing can be encoded for the wire
//! without holding it.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use rotel_core::command::LogicalCommand;
use rotel_core::error::{Error, Result};
use rotel_core::types::{Dialect, Zone};
use rotel_protocol::codec::WireCodec;
use rotel_protocol::io::DeviceIo;

/// Result of a logical command that did not fail on I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// At least one frame was written.
    Sent,
    /// Valid but not applicable now (zone in standby, fixed volume, value
    /// out of bounds, nothing to change).
    Ignored,
    /// The model has no native token for the command in this dialect.
    Unsupported,
}

/// Serializes all outbound activity of one device connection.
pub struct Sequencer {
    encoder: Mutex<Box<dyn WireCodec>>,
    dialect: Dialect,
    io: DeviceIo,
}

impl Sequencer {
    pub fn new(encoder: Box<dyn WireCodec>, io: DeviceIo) -> Self {
        Sequencer {
            dialect: encoder.dialect(),
            encoder: Mutex::new(encoder),
            io,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The IO task handle, for opening, closing and the connected flag.
    pub fn io(&self) -> &DeviceIo {
        &self.io
    }

    /// Take the ordering lock.
    ///
    /// With a `cancel` token, pauses inside the sequence abort with
    /// [`Error::Interrupted`] once the token fires, and so does waiting for
    /// the lock itself.
    pub async fn begin(&self, cancel: Option<CancellationToken>) -> Result<Sequence<'_>> {
        let encoder = match &cancel {
            Some(token) => tokio::select! {
                guard = self.encoder.lock() => guard,
                _ = token.cancelled() => return Err(Error::Interrupted),
            },
            None => self.encoder.lock().await,
        };
        Ok(Sequence {
            encoder,
            io: &self.io,
            cancel,
        })
    }

    /// Send a single command under the lock.
    pub async fn send(
        &self,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        self.begin(None).await?.send(zone, cmd, value).await
    }
}

/// An exclusive run of writes and pauses.
pub struct Sequence<'a> {
    encoder: MutexGuard<'a, Box<dyn WireCodec>>,
    io: &'a DeviceIo,
    cancel: Option<CancellationToken>,
}

impl Sequence<'_> {
    pub fn dialect(&self) -> Dialect {
        self.encoder.dialect()
    }

    /// Encode and write one command.
    ///
    /// A command without a native token is not an error: nothing is written
    /// and [`SubmitOutcome::Unsupported`] is returned.
    pub async fn send(
        &mut self,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        let frame = match self.encoder.encode(zone, cmd, value) {
            Ok(frame) => frame,
            Err(Error::Unsupported(what)) => {
                debug!(%what, "command unsupported, ignored");
                return Ok(SubmitOutcome::Unsupported);
            }
            Err(e) => return Err(e),
        };
        trace!(%zone, %cmd, ?value, "sending command");
        self.io.write(frame).await?;
        Ok(SubmitOutcome::Sent)
    }

    /// Sleep `ms` milliseconds while keeping the lock.
    pub async fn pause(&self, ms: u64) -> Result<()> {
        let sleep = tokio::time::sleep(Duration::from_millis(ms));
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = sleep => Ok(()),
                _ = token.cancelled() => Err(Error::Interrupted),
            },
            None => {
                sleep.await;
                Ok(())
            }
        }
    }
}
