//! Error types for rotel-rs.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, codec failures,
//! configuration mistakes and interrupted command sequences all end up here.

/// The error type for all rotel-rs operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (bad HEX frame, malformed ASCII feedback).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for data from the device.
    ///
    /// Receivers only talk when something changes, so a timeout on a read
    /// is an ordinary outcome and not a fault.
    #[error("timeout waiting for response")]
    Timeout,

    /// The device model or wire dialect has no encoding for this command.
    ///
    /// Callers treat this as a silent no-op, never as a communication fault.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The configuration cannot work (missing host, serial-over-IP port name,
    /// dialect not spoken by the model). Not retried until reconfigured.
    #[error("configuration error: {0}")]
    Config(String),

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An internal channel was closed (IO task or dispatcher has exited).
    #[error("stream closed")]
    StreamClosed,

    /// A delay inside a command sequence was cancelled before it elapsed.
    #[error("command sequence interrupted")]
    Interrupted,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a configuration problem that retrying cannot fix.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("bad checksum".into());
        assert_eq!(e.to_string(), "protocol error: bad checksum");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("BalanceSet on HEX".into());
        assert_eq!(e.to_string(), "unsupported operation: BalanceSet on HEX");
    }

    #[test]
    fn error_display_config() {
        let e = Error::Config("serial port or host must be set".into());
        assert_eq!(
            e.to_string(),
            "configuration error: serial port or host must be set"
        );
        assert!(e.is_config());
        assert!(!Error::Timeout.is_config());
    }

    #[test]
    fn error_display_connection_states() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
        assert_eq!(Error::StreamClosed.to_string(), "stream closed");
        assert_eq!(
            Error::Interrupted.to_string(),
            "command sequence interrupted"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn result_alias_works() {
        let ok: Result<u32> = Ok(42);
        assert!(matches!(ok, Ok(42)));

        let err: Result<u32> = Err(Error::Timeout);
        assert!(err.is_err());
    }
}
