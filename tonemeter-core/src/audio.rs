//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It implements [`CaptureProvider`] on the default host: each input request
//! opens the device on a dedicated capture thread, which answers the request
//! and then owns the stream until the session asks it to stop.
//!
//! ## Features
//! - Device selection by name, falling back to the default input device
//! - Mono mixdown of multi-channel input
//! - Bounded block queue; blocks are dropped rather than blocking the callback
//! - Stream failures mark the session inactive

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::Sender;

use crate::capture::{CaptureConstraints, CaptureProvider, CaptureSession, PendingCapture};
use crate::error::CaptureError;

/// Number of sample blocks buffered between the capture callback and the sampler.
pub const FRAME_QUEUE_CAPACITY: usize = 64;

/// Sample rate used when the host cannot report one for its default devices.
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Capture provider backed by the default CPAL host.
#[derive(Debug, Clone)]
pub struct CpalCaptureProvider {
    sample_rate: Option<u32>,
}

impl CpalCaptureProvider {
    /// Probes the default host for its nominal sample rate.
    ///
    /// The default input device's rate is preferred, then the default
    /// output device's. With neither device present the provider reports
    /// no audio subsystem.
    pub fn new() -> Self {
        let host = cpal::default_host();
        let input_rate = host
            .default_input_device()
            .and_then(|d| d.default_input_config().ok())
            .map(|c| c.sample_rate().0);
        let output_rate = || {
            host.default_output_device()
                .and_then(|d| d.default_output_config().ok())
                .map(|c| c.sample_rate().0)
        };
        let sample_rate = input_rate.or_else(output_rate);
        match sample_rate {
            Some(rate) => log::info!("Audio host {:?} at {} Hz", host.id(), rate),
            None => log::warn!("Audio host {:?} has no usable default device", host.id()),
        }
        Self { sample_rate }
    }
}

impl Default for CpalCaptureProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureProvider for CpalCaptureProvider {
    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn request_audio_input(&mut self, constraints: &CaptureConstraints) -> PendingCapture {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let constraints = constraints.clone();
        let target_rate = self.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE);

        let reply = reply_tx.clone();
        let spawned = thread::Builder::new()
            .name("tonemeter-capture".to_string())
            .spawn(move || run_capture_thread(constraints, target_rate, reply));

        if let Err(e) = spawned {
            let _ = reply_tx.send(Err(CaptureError::Stream(format!(
                "could not spawn capture thread: {}",
                e
            ))));
        }
        reply_rx
    }
}

/// Body of the capture thread: open, answer, then hold the stream.
fn run_capture_thread(
    constraints: CaptureConstraints,
    target_rate: u32,
    reply: Sender<Result<CaptureSession, CaptureError>>,
) {
    if constraints.echo_cancellation || constraints.noise_suppression || constraints.auto_gain_control {
        log::warn!("Input processing was requested but CPAL only delivers raw input");
    }

    let (frames_tx, frames_rx) = crossbeam_channel::bounded(FRAME_QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let active = Arc::new(AtomicBool::new(true));

    let (stream, device_id, sample_rate) =
        match open_input_stream(constraints.device_id.as_deref(), target_rate, frames_tx, active.clone()) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

    let session = CaptureSession::new(device_id, sample_rate, frames_rx, shutdown_tx, active.clone());
    if reply.send(Ok(session)).is_err() {
        log::debug!("Input request was abandoned, closing stream");
        return;
    }

    // Returns on an explicit release, or with an error once the session is dropped.
    let _ = shutdown_rx.recv();
    active.store(false, Ordering::SeqCst);
    if let Err(e) = stream.pause() {
        log::warn!("Error pausing input stream: {}", e);
    }
    drop(stream);
    log::debug!("Capture thread finished");
}

/// Opens and starts the input stream.
///
/// # Returns
/// * `Ok((stream, device_id, sample_rate))` - Running stream and what it was opened with
/// * `Err(e)` - No device, permission denied or another backend failure
fn open_input_stream(
    device_id: Option<&str>,
    target_rate: u32,
    frames: Sender<Vec<f32>>,
    active: Arc<AtomicBool>,
) -> Result<(cpal::Stream, Option<String>, u32), CaptureError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_id)?;
    let name = device.name().ok();
    log::info!("Using audio input device: {:?}", name);

    let configs = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Stream(e.to_string()))?
        .collect::<Vec<_>>();
    let supported = match find_supported_config(configs, target_rate) {
        Some(range) => range.with_sample_rate(cpal::SampleRate(target_rate)),
        None => {
            let fallback = device
                .default_input_config()
                .map_err(|e| CaptureError::Stream(e.to_string()))?;
            log::warn!(
                "Device does not support {} Hz, using {} Hz",
                target_rate,
                fallback.sample_rate().0
            );
            fallback
        }
    };

    let sample_rate = supported.sample_rate().0;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, frames, active),
        cpal::SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, frames, active),
        cpal::SampleFormat::U16 => build_mono_stream::<u16>(&device, &config, frames, active),
        other => {
            return Err(CaptureError::Stream(format!("unsupported sample format {:?}", other)));
        }
    }
    .map_err(classify_build_error)?;

    stream.play().map_err(classify_play_error)?;
    Ok((stream, name, sample_rate))
}

/// Finds the device named `device_id`, or the default input device.
fn select_device(host: &cpal::Host, device_id: Option<&str>) -> Result<cpal::Device, CaptureError> {
    if let Some(wanted) = device_id {
        let found = host
            .input_devices()
            .map_err(|e| CaptureError::Stream(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("Input device {:?} not found, using default", wanted),
        }
    }
    host.default_input_device().ok_or(CaptureError::NoDevice)
}

/// Picks the input config with the fewest channels that supports `target_rate`.
///
/// Only sample formats the capture callback can convert are considered.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            matches!(
                c.sample_format(),
                cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
            )
        })
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| {
            let float_first = if c.sample_format() == cpal::SampleFormat::F32 { 0 } else { 1 };
            (c.channels(), float_first)
        })
}

/// Builds an input stream that mixes each frame down to one f32 sample.
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frames: Sender<Vec<f32>>,
    active: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let err_fn = move |err: cpal::StreamError| {
        log::error!("An error occurred on the input stream: {}", err);
        active.store(false, Ordering::SeqCst);
    };

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let block: Vec<f32> = data
                .chunks(channels)
                .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32)
                .collect();
            // Drop the block if the sampler is not keeping up.
            let _ = frames.try_send(block);
        },
        err_fn,
        None,
    )
}

fn classify_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        cpal::BuildStreamError::BackendSpecific { err } => classify_backend_message(err.description),
        other => CaptureError::Stream(other.to_string()),
    }
}

fn classify_play_error(err: cpal::PlayStreamError) -> CaptureError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        cpal::PlayStreamError::BackendSpecific { err } => classify_backend_message(err.description),
        #[allow(unreachable_patterns)]
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Backends report access denial only as free text.
fn classify_backend_message(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Stream(description)
    }
}
