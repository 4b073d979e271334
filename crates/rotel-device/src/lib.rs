//! Device layer for rotel-rs.
//!
//! Everything stateful about talking to one receiver lives here:
//!
//! - **Session** ([`session`]) -- interprets feedback into [`SessionState`],
//!   emits change notifications, runs logical commands and reconnects.
//! - **Dispatcher** ([`dispatcher`]) -- feeds decoded feedback to the
//!   session strictly in arrival order.
//! - **Sequencer** ([`sequencer`]) -- serializes every outbound write,
//!   including multi-step sequences with pauses.
//! - **Timers** ([`timers`]) and **priming** ([`priming`]) -- the deferred
//!   power-off confirmation and the post-power-on state refresh tables.
//! - **Supervisor** ([`supervisor`]) -- periodic reconnection.
//! - **Models** ([`models`]) -- the compiled-in device catalogue.
//! - **Simulator** ([`simulator`]) -- an in-memory receiver speaking any
//!   dialect of any catalogued model.
//! - **Builder** ([`builder`]) and **client** ([`client`]) -- the public
//!   entry points.
//!
//! # Example
//!
//! ```no_run
//! use rotel_device::{RotelBuilder, models};
//! use rotel_core::command::LogicalCommand;
//! use rotel_core::types::Zone;
//!
//! # async fn example() -> rotel_core::Result<()> {
//! let client = RotelBuilder::new(models::ra_1572())
//!     .host("192.168.1.40")
//!     .tcp_port(9590)
//!     .build()
//!     .await?;
//! let mut events = client.subscribe();
//! client.submit(Zone::MAIN, LogicalCommand::PowerOn, None).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod dispatcher;
pub mod models;
pub mod priming;
pub mod sequencer;
pub mod session;
pub mod simulator;
pub mod state;
pub mod supervisor;
pub mod timers;

pub use builder::RotelBuilder;
pub use client::RotelClient;
pub use sequencer::SubmitOutcome;
pub use session::{ReconnectOutcome, Session, SessionOptions};
pub use simulator::SimulatedTransport;
pub use state::{SessionState, ZoneState};
