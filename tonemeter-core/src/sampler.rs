//! # Frequency-Domain Sampler
//!
//! Owns the byte spectrum transform and a sliding window of the most recent
//! samples from an attached capture session. `sample()` never blocks: it
//! drains whatever the capture thread has queued and transforms the window.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::capture::{CaptureProvider, CaptureSession};
use crate::config::AnalysisConfig;
use crate::error::MonitorError;
use crate::fft::ByteSpectrum;

/// Byte magnitudes for one analysis tick, one entry per frequency bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnitudeSnapshot {
    bins: Vec<u8>,
}

impl MagnitudeSnapshot {
    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

pub struct Sampler {
    config: AnalysisConfig,
    spectrum: ByteSpectrum,
    sample_rate: u32,
    gain: f32,
    input: Option<Receiver<Vec<f32>>>,
    window: VecDeque<f32>,
}

impl Sampler {
    /// Builds the transform stage for `config`.
    ///
    /// # Returns
    /// * `Err(MonitorError::Init)` - The provider has no audio subsystem
    /// * `Err(MonitorError::Config)` - The config breaks an invariant
    pub fn initialize<P>(config: AnalysisConfig, provider: &P) -> Result<Self, MonitorError>
    where
        P: CaptureProvider + ?Sized,
    {
        let sample_rate = provider.sample_rate().ok_or(MonitorError::Init)?;
        config.validate()?;

        let spectrum = ByteSpectrum::new(&config);
        let window = VecDeque::from(vec![0.0; config.transform_size]);
        log::debug!(
            "Sampler ready: {} point transform at {} Hz",
            config.transform_size,
            sample_rate
        );
        Ok(Self {
            config,
            spectrum,
            sample_rate,
            gain: 1.0,
            input: None,
            window,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.bin_count()
    }

    pub fn is_attached(&self) -> bool {
        self.input.is_some()
    }

    /// Gain multiplied into every sample that enters the window from now on.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
    }

    /// Connects the session's input to the transform stage.
    ///
    /// Blocks queued before the attach are stale and get discarded.
    pub fn attach(&mut self, session: &CaptureSession) -> Result<(), MonitorError> {
        if !session.is_active() {
            return Err(MonitorError::Attach);
        }
        let frames = session.frames().clone();
        let stale = frames.try_iter().count();
        if stale > 0 {
            log::debug!("Discarded {} stale sample blocks on attach", stale);
        }
        if session.sample_rate() != self.sample_rate {
            log::info!(
                "Session runs at {} Hz, sampler nominal rate was {} Hz",
                session.sample_rate(),
                self.sample_rate
            );
            self.sample_rate = session.sample_rate();
        }
        self.input = Some(frames);
        Ok(())
    }

    /// Disconnects the input. The window and smoothing fall back to silence.
    pub fn detach(&mut self) {
        self.input = None;
        self.window.iter_mut().for_each(|s| *s = 0.0);
        self.spectrum.reset();
    }

    /// Returns the byte spectrum of the most recent window.
    ///
    /// Once the capture side hangs up, the sampler detaches itself and
    /// reports silence from then on.
    pub fn sample(&mut self) -> MagnitudeSnapshot {
        let mut disconnected = false;
        if let Some(frames) = &self.input {
            let size = self.config.transform_size;
            loop {
                let block = match frames.try_recv() {
                    Ok(block) => block,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                };
                for &sample in &block {
                    self.window.push_back(sample * self.gain);
                }
                while self.window.len() > size {
                    self.window.pop_front();
                }
            }
        }
        if disconnected {
            log::warn!("Capture input disconnected, sampling silence");
            self.detach();
        }

        let mut bins = vec![0u8; self.spectrum.bin_count()];
        let window = self.window.make_contiguous();
        self.spectrum.process(window, &mut bins);
        MagnitudeSnapshot::from_bins(bins)
    }
}
