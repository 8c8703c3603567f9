//! Error types for capture sessions.
//!
//! All errors implement `std::error::Error` and carry enough structured context
//! to decide whether a caller should retry.
//!
//! ## Error Categories
//!
//! - **Timeouts**: no datagram arrived within the caller's bound (data or control channel)
//! - **Packet Errors**: datagrams too short to carry the data header
//! - **Shape Errors**: organizer input incompatible with the requested geometry
//! - **Protocol Errors**: command literals or responses that break the wire convention
//! - **Socket Errors**: binding, sending or receiving failed at the OS level
//! - **Configuration Errors**: invalid geometry or unreadable configuration files
//!
//! Packet loss is deliberately absent from this list: the reassembler reports it
//! as a per-frame metric and never interrupts the stream for it.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use dca1000::CaptureError;
//! use std::time::Duration;
//!
//! let error = CaptureError::Timeout { duration: Duration::from_millis(100) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::command::CommandCode;

/// Result type alias for capture operations.
pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

/// Main error type for capture operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("No datagram received within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Malformed data packet: {len} bytes, header needs {needed}")]
    MalformedPacket { len: usize, needed: usize },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch { context: String, expected: String, actual: String },

    #[error("{} got no response within {duration:?}", describe_command(.command))]
    CommandTimeout { command: Option<CommandCode>, duration: Duration },

    #[error("Invalid frame geometry: {reason}")]
    InvalidGeometry { reason: String },

    #[error("Protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Socket operation failed: {operation}")]
    Socket {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_command(command: &Option<CommandCode>) -> String {
    match command {
        Some(code) => format!("Command {}", code),
        None => "Raw control message".to_string(),
    }
}

impl CaptureError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::Timeout { .. } => true,
            CaptureError::MalformedPacket { .. } => true,
            CaptureError::CommandTimeout { .. } => true,
            CaptureError::Socket { .. } => true,
            CaptureError::ShapeMismatch { .. } => false,
            CaptureError::InvalidGeometry { .. } => false,
            CaptureError::Protocol { .. } => false,
            CaptureError::Config { .. } => false,
            CaptureError::File { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CaptureError::Timeout { .. } => vec![
                "Check that the radar front end is chirping and recording was started",
                "Increase the read timeout",
                "Verify the host NIC is configured with the static capture address",
            ],
            CaptureError::MalformedPacket { .. } => vec![
                "Check that nothing else is sending to the data port",
                "Verify the board firmware streams raw capture packets",
            ],
            CaptureError::CommandTimeout { .. } => vec![
                "Power cycle the capture board",
                "Verify the device address and control port",
                "Retry the command; the board drops commands while busy",
            ],
            CaptureError::Socket { .. } => vec![
                "Check that the host address is assigned to a local interface",
                "Make sure no other process is bound to the capture ports",
                "Check firewall rules for UDP traffic",
            ],
            CaptureError::ShapeMismatch { .. } => vec![
                "Check chirp, channel and sample counts against the radar profile",
                "Verify the frame was produced with the same geometry",
            ],
            CaptureError::InvalidGeometry { .. } => vec![
                "All geometry dimensions must be non-zero",
                "Packet payload size must fit in the maximum datagram size",
            ],
            CaptureError::Protocol { .. } => vec![
                "Check hex literals contain an even number of hex digits",
                "Verify board firmware version compatibility",
            ],
            CaptureError::Config { .. } => vec![
                "Check the configuration file against the documented fields",
                "Remove unknown keys or fix value types",
            ],
            CaptureError::File { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
        }
    }

    /// Helper constructor for socket errors.
    pub fn socket(operation: impl Into<String>, source: std::io::Error) -> Self {
        CaptureError::Socket { operation: operation.into(), source }
    }

    /// Helper constructor for shape mismatches.
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        CaptureError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Helper constructor for geometry validation errors.
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        CaptureError::InvalidGeometry { reason: reason.into() }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(context: impl Into<String>, details: impl Into<String>) -> Self {
        CaptureError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        CaptureError::Config { reason: reason.into() }
    }

    /// Whether this error is a plain timeout on either channel.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CaptureError::Timeout { .. } | CaptureError::CommandTimeout { .. })
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Socket { operation: "<unknown>".to_string(), source: err }
    }
}

/// Whether an I/O error from a socket read means the read timeout elapsed.
///
/// Unix reports `WouldBlock`, Windows reports `TimedOut`.
pub(crate) fn is_timeout_kind(err: &std::io::Error) -> bool {
    matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_their_context(
                context in "[a-z ]{1,20}",
                expected in 1usize..100_000,
                actual in 1usize..100_000,
                len in 0usize..10,
                duration_ms in 1u64..60_000u64
            ) {
                let shape = CaptureError::shape_mismatch(context.clone(), expected, actual);
                let message = shape.to_string();
                prop_assert!(message.contains(&context));
                prop_assert!(message.contains(&expected.to_string()));
                prop_assert!(message.contains(&actual.to_string()));

                let malformed = CaptureError::MalformedPacket { len, needed: 10 };
                prop_assert!(malformed.to_string().contains(&len.to_string()));

                let duration = Duration::from_millis(duration_ms);
                let timeout = CaptureError::Timeout { duration };
                prop_assert!(!timeout.to_string().is_empty());
                prop_assert!(timeout.is_retryable());
            }

            #[test]
            fn io_errors_convert_to_socket_errors(reason in ".*") {
                let io_err = std::io::Error::other(reason.clone());
                let converted: CaptureError = io_err.into();
                match converted {
                    CaptureError::Socket { source, .. } => {
                        prop_assert_eq!(source.to_string(), reason);
                    }
                    _ => prop_assert!(false, "Expected Socket error from io::Error conversion"),
                }
            }
        }
    }

    #[test]
    fn command_timeout_names_the_command() {
        let err = CaptureError::CommandTimeout {
            command: Some(CommandCode::SystemConnect),
            duration: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("SYSTEM_CONNECT"));
        assert!(err.is_timeout());

        let raw = CaptureError::CommandTimeout { command: None, duration: Duration::from_secs(1) };
        assert!(raw.to_string().starts_with("Raw control message"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CaptureError>();

        let error = CaptureError::config("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(CaptureError::Timeout { duration: Duration::from_millis(1) }.is_retryable());
        assert!(CaptureError::MalformedPacket { len: 3, needed: 10 }.is_retryable());
        assert!(!CaptureError::shape_mismatch("reshape", 4, 5).is_retryable());
        assert!(!CaptureError::invalid_geometry("zero chirps").is_retryable());

        for suggestion in CaptureError::config("bad").recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
    }

    #[test]
    fn timeout_kinds_are_recognised() {
        let would_block = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        let timed_out = std::io::Error::from(std::io::ErrorKind::TimedOut);
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(is_timeout_kind(&would_block));
        assert!(is_timeout_kind(&timed_out));
        assert!(!is_timeout_kind(&refused));
    }
}
