//! # Error Module
//!
//! Error types shared by the sampler, the capture session manager and the
//! analysis loop controller.

use thiserror::Error;

/// Errors surfaced by the monitor to its caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    /// No audio subsystem is available. Fatal to the whole monitor.
    #[error("No audio subsystem available")]
    Init,

    #[error("Invalid analysis config: {0}")]
    Config(String),

    /// The user declined access to the input device.
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("No audio input device found")]
    NoDevice,

    #[error("Failed to open input stream: {0}")]
    Stream(String),

    /// The sampler was attached to an inactive session. Indicates a
    /// sequencing bug, not a user-recoverable condition.
    #[error("Cannot attach sampler to an inactive capture session")]
    Attach,
}

impl MonitorError {
    /// Whether a later `start()` may succeed after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MonitorError::PermissionDenied | MonitorError::NoDevice | MonitorError::Stream(_)
        )
    }
}

/// Result of a single audio input request, as reported by a capture provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Permission denied by the audio host")]
    PermissionDenied,

    #[error("No input device available")]
    NoDevice,

    #[error("{0}")]
    Stream(String),
}

impl From<CaptureError> for MonitorError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => MonitorError::PermissionDenied,
            CaptureError::NoDevice => MonitorError::NoDevice,
            CaptureError::Stream(msg) => MonitorError::Stream(msg),
        }
    }
}
