//! # rotel -- Control Rotel A/V receivers over RS-232 or IP
//!
//! `rotel` is an asynchronous Rust library for Rotel surround processors,
//! receivers, integrated amplifiers and CD players. It keeps a live model of
//! the device's state from its feedback, reports every change through a
//! broadcast channel, and hides the three wire protocols the product range
//! has used over the years behind one set of logical commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rotel::{LogicalCommand, Zone};
//! use rotel::device::{RotelBuilder, models::ra_1572};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RotelBuilder::new(ra_1572())
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     client.submit(Zone::MAIN, LogicalCommand::PowerOn, None).await?;
//!     client.submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(30)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                              |
//! |----------------------|------------------------------------------------------|
//! | `rotel-core`         | Types, [`DeviceModel`], [`LogicalCommand`], errors   |
//! | `rotel-transport`    | Serial and TCP transport implementations             |
//! | `rotel-protocol`     | HEX, ASCII V1 and ASCII V2 codecs and the IO task    |
//! | `rotel-device`       | Session, sequencer, supervisor, models, simulator    |
//! | **`rotel`**          | This facade crate -- re-exports everything           |
//!
//! ## Protocols
//!
//! - **HEX** -- binary frames (`FE` start byte, device id, checksum). The
//!   device answers with a snapshot of its front-panel display, which is
//!   scraped for state.
//! - **ASCII V1** -- `!`-terminated `key=value` text with `get_*` queries.
//! - **ASCII V2** -- `$`-terminated `key=value` text with `?` queries.
//!
//! ## Events
//!
//! ```no_run
//! use rotel::DeviceEvent;
//! # async fn example(client: &rotel::device::RotelClient) {
//! let mut events = client.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         DeviceEvent::StateChanged { zone, attribute, value } => {
//!             println!("{zone} {attribute:?} = {value:?}");
//!         }
//!         DeviceEvent::ConnectionStatusChanged { status, reason } => {
//!             println!("{status} {reason}");
//!         }
//!     }
//! }
//! # }
//! ```

pub use rotel_core::*;

/// Device session, builder, client, model catalogue and simulator.
pub mod device {
    pub use rotel_device::*;
}

/// Wire codecs and the IO task.
pub mod protocol {
    pub use rotel_protocol::*;
}

/// Serial and TCP transports.
pub mod transport {
    pub use rotel_transport::*;
}

/// Every catalogued model.
///
/// # Example
///
/// ```
/// for model in rotel::supported_models() {
///     println!("{} ({})", model.name, model.default_dialect);
/// }
/// ```
pub fn supported_models() -> Vec<DeviceModel> {
    rotel_device::models::all_models()
}
