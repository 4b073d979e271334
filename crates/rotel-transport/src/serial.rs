//! Serial port transport for receiver communication.
//!
//! This module provides [`SerialTransport`], which implements the [`Transport`]
//! trait for RS-232 connections (usually through a USB adapter).
//!
//! Rotel devices use 8N1 without flow control. Older HEX models run at
//! 19200 baud; the ASCII generation of amplifiers and CD players defaults to
//! 115200.
//!
//! # Example
//!
//! ```no_run
//! use rotel_transport::SerialTransport;
//! use rotel_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rotel_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//!
//! transport.send(b"power?").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rotel_core::error::{Error, Result};
use rotel_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial port configuration.
///
/// Defaults match the factory RS-232 settings of HEX-era receivers:
/// 19200 baud, 8 data bits, 1 stop bit, no parity, no flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (19200 for HEX models, 115200 for most ASCII models)
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 19_200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Serial port transport.
///
/// The transport remembers its port name and configuration so the reconnect
/// supervisor can close and reopen it any number of times.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
    config: SerialConfig,
}

impl SerialTransport {
    /// Create an unopened transport. Call [`Transport::open`] to connect.
    pub fn new(port: &str, config: SerialConfig) -> Self {
        Self {
            port: None,
            port_name: port.to_string(),
            config,
        }
    }

    /// Open a serial port with the given baud rate and default 8N1 settings.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        let mut transport = Self::new(port, config);
        Transport::open(&mut transport).await?;
        Ok(transport)
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Map an I/O error, dropping the port when the link is gone.
    fn link_error(&mut self, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected {
            self.port = None;
            Error::ConnectionLost
        } else {
            Error::Io(e)
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let config = &self.config;
        tracing::debug!(
            port = %self.port_name,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let stream = tokio_serial::new(&self.port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(config.flow_control.into())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %self.port_name, error = %e, "Failed to open serial port");
                Error::Transport(format!("failed to open serial port {}: {}", self.port_name, e))
            })?;

        tracing::info!(port = %self.port_name, baud_rate = config.baud_rate, "Serial port opened");
        self.port = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = ?data, "Sending data");

        let result = match port.write_all(data).await {
            Ok(()) => port.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!(port = %self.port_name, error = %e, "Failed to send data");
            return Err(self.link_error(e));
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = ?&buf[..n], "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::debug!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(self.link_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 19_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn test_new_is_not_connected() {
        let t = SerialTransport::new("/dev/ttyUSB9", SerialConfig::default());
        assert!(!t.is_connected());
        assert_eq!(t.port_name(), "/dev/ttyUSB9");
        assert_eq!(t.config().baud_rate, 19_200);
    }

    #[tokio::test]
    async fn test_send_when_closed_is_not_connected() {
        let mut t = SerialTransport::new("/dev/ttyUSB9", SerialConfig::default());
        let err = t.send(b"power?").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        let mut buf = [0u8; 8];
        let err = t
            .receive(&mut buf, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut t = SerialTransport::new("/dev/ttyUSB9", SerialConfig::default());
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert!(!t.is_connected());
    }

    #[tokio::test]
    async fn test_open_missing_port_is_transport_error() {
        let mut t = SerialTransport::new("/dev/does-not-exist-rotel", SerialConfig::default());
        let err = Transport::open(&mut t).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!t.is_connected());
    }

    #[test]
    fn test_enum_conversions() {
        let _: tokio_serial::DataBits = DataBits::Seven.into();
        let _: tokio_serial::StopBits = StopBits::Two.into();
        let _: tokio_serial::Parity = Parity::Even.into();
        let _: tokio_serial::FlowControl = FlowControl::Hardware.into();
    }
}
