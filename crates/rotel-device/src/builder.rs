//! RotelBuilder -- fluent builder for constructing [`RotelClient`] instances.
//!
//! Separates configuration from construction: pick a model, then either a
//! serial port, a TCP endpoint or the simulator, and optionally tune the
//! dialect and timing. [`build()`](RotelBuilder::build) never fails because
//! the device is unreachable; the first connection attempt is made by the
//! reconnect supervisor one second later.
//!
//! # Example
//!
//! ```no_run
//! use rotel_device::builder::RotelBuilder;
//! use rotel_device::models::rsp_1570;
//! use rotel_core::types::Dialect;
//!
//! # async fn example() -> rotel_core::Result<()> {
//! let client = RotelBuilder::new(rsp_1570())
//!     .serial_port("/dev/ttyUSB0")
//!     .dialect(Dialect::AsciiV1)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use rotel_core::error::{Error, Result};
use rotel_core::model::DeviceModel;
use rotel_core::transport::Transport;
use rotel_core::types::Dialect;
use rotel_transport::{SerialConfig, SerialTransport, TcpTransport};

use crate::client::RotelClient;
use crate::session::{Session, SessionOptions};
use crate::simulator::SimulatedTransport;
use crate::supervisor::{DEFAULT_POLL_INTERVAL, Supervisor};

/// Fluent builder for [`RotelClient`].
pub struct RotelBuilder {
    model: DeviceModel,
    dialect: Option<Dialect>,
    serial_port: Option<String>,
    baud_rate: Option<u32>,
    serial_config: Option<SerialConfig>,
    host: Option<String>,
    tcp_port: Option<u16>,
    simulate: bool,
    poll_interval: Duration,
    options: SessionOptions,
}

impl RotelBuilder {
    /// Create a new builder for the given model.
    pub fn new(model: DeviceModel) -> Self {
        RotelBuilder {
            model,
            dialect: None,
            serial_port: None,
            baud_rate: None,
            serial_config: None,
            host: None,
            tcp_port: None,
            simulate: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            options: SessionOptions::default(),
        }
    }

    /// Protocol dialect. Defaults to the model's declared default.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the model's default baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Full serial line settings. An explicit [`baud_rate`](Self::baud_rate)
    /// still takes precedence.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial_config = Some(config);
        self
    }

    /// Host name or address of an IP-connected device.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    /// Talk to a simulated device instead of real hardware. Serial and TCP
    /// settings are ignored.
    pub fn simulate(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    /// Interval between connection checks (default: 60s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait between power-on and the state refresh that follows it
    /// (default: 2.5s).
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.options.settle_delay = delay;
        self
    }

    /// How long a HEX device may stay silent after a blank display before
    /// it is taken as switched off (default: 2s).
    pub fn power_off_grace(mut self, delay: Duration) -> Self {
        self.options.power_off_grace = delay;
        self
    }

    /// Capacity of the notification channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    fn resolve_dialect(&self) -> Result<Dialect> {
        let dialect = self.dialect.unwrap_or(self.model.default_dialect);
        if !self.model.supports_dialect(dialect) {
            return Err(Error::Config(format!(
                "{} does not support the {dialect} protocol",
                self.model.name
            )));
        }
        Ok(dialect)
    }

    fn transport(&self, dialect: Dialect) -> Result<Box<dyn Transport>> {
        if self.simulate {
            let model = Arc::new(self.model.clone());
            return Ok(Box::new(SimulatedTransport::new(model, dialect)));
        }
        if let Some(port) = &self.serial_port {
            if port.to_ascii_lowercase().starts_with("rfc2217") {
                return Err(Error::Config(
                    "serial over IP is not a serial port, use host and port".into(),
                ));
            }
            let mut config = self.serial_config.clone().unwrap_or_else(|| SerialConfig {
                baud_rate: self.model.default_baud_rate,
                ..SerialConfig::default()
            });
            if let Some(baud) = self.baud_rate {
                config.baud_rate = baud;
            }
            return Ok(Box::new(SerialTransport::new(port, config)));
        }
        if let Some(host) = &self.host {
            return match self.tcp_port {
                Some(port) if port > 0 => Ok(Box::new(TcpTransport::new(host, port))),
                _ => Err(Error::Config("a TCP port must be set with the host".into())),
            };
        }
        Err(Error::Config("serial port or host must be set".into()))
    }

    /// Build a [`RotelClient`] with a caller-provided transport.
    ///
    /// The entry point for tests (pass a `MockTransport` from
    /// `rotel-test-harness`) and custom transports. The transport may be
    /// open or closed; the supervisor reopens it either way.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<RotelClient> {
        let dialect = self.resolve_dialect()?;
        debug!(
            model = self.model.name,
            %dialect,
            poll_ms = self.poll_interval.as_millis() as u64,
            "building client"
        );
        let session = Session::start(Arc::new(self.model), dialect, transport, self.options);
        let supervisor = Supervisor::spawn(session.clone(), self.poll_interval);
        Ok(RotelClient::new(session, supervisor))
    }

    /// Build a [`RotelClient`] from the configured connection settings.
    ///
    /// Requires a serial port, a host and TCP port, or the simulator.
    pub async fn build(self) -> Result<RotelClient> {
        let dialect = self.resolve_dialect()?;
        let transport = self.transport(dialect)?;
        self.build_with_transport(transport).await
    }
}
