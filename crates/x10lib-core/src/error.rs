//! Error types for x10lib.
//!
//! Fallible operations across the library return [`Result<T>`], which uses
//! [`Error`] as the error type. The command API itself reports success as a
//! `bool`; these errors surface from transports and from `open()`.

/// The error type for x10lib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port missing, open or write failed).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed burst, unexpected reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No data arrived before the receive deadline.
    ///
    /// Protocol engines treat this as an empty read, not a failure.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command or builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The transport has not been opened, or was closed.
    #[error("not connected")]
    NotConnected,

    /// The link to the interface was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("/dev/ttyUSB9 does not exist".into());
        assert_eq!(e.to_string(), "transport error: /dev/ttyUSB9 does not exist");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("short burst".into());
        assert_eq!(e.to_string(), "protocol error: short burst");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("unit 17".into());
        assert_eq!(e.to_string(), "invalid parameter: unit 17");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_display_connection_lost() {
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
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
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
