// tonemeter-core/src/lib.rs

//! The core logic for the ToneMeter microphone monitor.
//! This crate is responsible for audio capture, spectrum sampling,
//! volume/pitch metrics and the analysis loop state machine. It is
//! completely headless and contains no GUI code.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod fft;
pub mod metrics;
pub mod monitor;
pub mod sampler;
pub mod schedule;
pub mod tuning;

pub use capture::{CaptureConstraints, CaptureProvider, CaptureSession, PendingCapture};
pub use config::{AnalysisConfig, GainSettings};
pub use error::{CaptureError, MonitorError};
pub use metrics::Metrics;
pub use monitor::{LoopState, MonitorStatus, TickReport, ToneMeter};
pub use sampler::MagnitudeSnapshot;
