//! Error types shared across the client core.
//!
//! The taxonomy mirrors how failures are surfaced to the host UI: permission
//! and hardware problems are user-correctable, connect failures abort the
//! attempt with a single message, and everything that happens inside a live
//! session (bad audio chunk, failed tool handler, stalled visual source) is
//! contained without ending the session.

use thiserror::Error;

/// Errors that can occur in the realtime client core.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Microphone, camera, or screen access was refused by the user or OS
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The requested capture hardware does not exist
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Opening the inference session failed (network, auth, quota)
    #[error("Connection failed: {0}")]
    ConnectError(String),

    /// Inbound audio or transport text could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A dispatched tool handler failed
    #[error("Tool handler failed: {0}")]
    ToolHandlerError(String),

    /// The visual source has no frame ready yet
    #[error("Visual source not ready")]
    CaptureStall,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl ClientError {
    /// Short status string suitable for direct display in the host UI.
    ///
    /// Raw internal payloads stay in the `Display` form and the logs; this
    /// is the coarse, user-facing summary.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::PermissionDenied(_) => "Access to the device was denied",
            ClientError::DeviceUnavailable(_) => "No suitable device was found",
            ClientError::ConnectError(_) => "Could not reach the companion service",
            ClientError::DecodeError(_) => "Received malformed audio",
            ClientError::ToolHandlerError(_) => "A requested action failed",
            ClientError::CaptureStall => "Video source is not ready",
            ClientError::InvalidConfiguration(_) => "Client is misconfigured",
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
