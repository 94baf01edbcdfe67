//! Error types for the scrcpy-recv crate.

use std::fmt;
use std::time::Duration;

use crate::types::{DeviceId, EventKind, RegistrationId, Token};

/// Errors returned by session, registry and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// The engine could not allocate a native context for the token
    #[error("Failed to allocate native session for token {token}")]
    AllocationFailure {
        /// The token the session was requested for
        token: Token,
    },

    /// An argument was rejected before reaching the engine
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session was already released
    #[error("Session {token} has been released")]
    UseAfterRelease {
        /// Token of the released session
        token: Token,
    },

    /// A handler panicked or did not finish before the dispatch deadline
    #[error("Handler for {kind} on device {device} failed: {fault}")]
    HandlerPanic {
        /// Event kind being dispatched
        kind: EventKind,
        /// Device the event was for
        device: DeviceId,
        /// What went wrong
        fault: HandlerFault,
    },

    /// No handler is registered under this ID
    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    /// A worker thread or the dispatch pool could not be started
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// How a single handler failed during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerFault {
    /// The handler panicked with the given message
    Panicked(String),
    /// The handler was still running when the deadline expired
    TimedOut(Duration),
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFault::Panicked(message) => write!(f, "panicked: {}", message),
            HandlerFault::TimedOut(deadline) => {
                write!(f, "still running after {}ms", deadline.as_millis())
            }
        }
    }
}

/// Convenience type alias for Results using ReceiverError.
pub type Result<T> = std::result::Result<T, ReceiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_error_display() {
        let error = ReceiverError::AllocationFailure {
            token: Token::new("A"),
        };
        assert_eq!(error.to_string(), "Failed to allocate native session for token A");

        let error = ReceiverError::InvalidArgument("control payload is empty".to_string());
        assert_eq!(error.to_string(), "Invalid argument: control payload is empty");

        let error = ReceiverError::UseAfterRelease {
            token: Token::new("A"),
        };
        assert_eq!(error.to_string(), "Session A has been released");

        let error = ReceiverError::Configuration("max_blocking_threads is 0".to_string());
        assert_eq!(error.to_string(), "Configuration error: max_blocking_threads is 0");
    }

    #[test]
    fn test_handler_panic_display() {
        let error = ReceiverError::HandlerPanic {
            kind: EventKind::FrameImage,
            device: DeviceId::new("d1"),
            fault: HandlerFault::Panicked("boom".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Handler for frame_image on device d1 failed: panicked: boom"
        );

        let error = ReceiverError::HandlerPanic {
            kind: EventKind::FrameImage,
            device: DeviceId::new("d1"),
            fault: HandlerFault::TimedOut(Duration::from_millis(250)),
        };
        assert!(error.to_string().contains("still running after 250ms"));
    }

    #[test]
    fn test_error_conversion_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "no threads");
        let error: ReceiverError = io_error.into();

        match error {
            ReceiverError::Spawn(e) => assert_eq!(e.to_string(), "no threads"),
            _ => panic!("Expected Spawn variant"),
        }
    }
}
