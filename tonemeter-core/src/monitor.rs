//! # Analysis Loop Controller
//!
//! [`ToneMeter`] ties the capture session manager, the sampler and the
//! metrics extractor together behind a small state machine:
//!
//! ```text
//! Idle -> Requesting -> Running -> Stopped -> Requesting -> ...
//! ```
//!
//! The host calls [`ToneMeter::poll`] from its timer. Each due tick samples
//! the spectrum, extracts metrics and notifies both observers before the
//! next tick is scheduled, so ticks never overlap.

use std::time::{Duration, Instant};

use crate::capture::{AcquireStatus, CaptureProvider, CaptureSessionManager, PermissionCache};
use crate::config::{AnalysisConfig, GainSettings};
use crate::error::MonitorError;
use crate::metrics::Metrics;
use crate::sampler::{MagnitudeSnapshot, Sampler};
use crate::schedule::{RepeatingTask, TaskHandle};

/// Lifecycle of the analysis loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Requesting,
    Running,
    Stopped,
}

/// What the status indicator should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Inactive,
    Requesting,
    Active,
    Error,
}

/// Data produced by one tick, handed to the host for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub metrics: Metrics,
    pub snapshot: MagnitudeSnapshot,
}

type VolumeObserver = Box<dyn FnMut(u8)>;
type ToneObserver = Box<dyn FnMut(&Metrics)>;

pub struct ToneMeter<P> {
    sessions: CaptureSessionManager<P>,
    sampler: Sampler,
    task: RepeatingTask,
    tick: Option<TaskHandle>,
    state: LoopState,
    failed: bool,
    interval: Duration,
    gain: GainSettings,
    preferred_device: Option<String>,
    latest: Metrics,
    on_volume_change: Option<VolumeObserver>,
    on_tone_detected: Option<ToneObserver>,
}

impl<P: CaptureProvider> ToneMeter<P> {
    /// Creates an idle monitor.
    ///
    /// # Returns
    /// * `Err(MonitorError::Init)` - No audio subsystem; fatal, do not retry
    /// * `Err(MonitorError::Config)` - Invalid analysis config
    pub fn new(config: AnalysisConfig, provider: P) -> Result<Self, MonitorError> {
        Self::with_cache(config, provider, PermissionCache::default())
    }

    pub fn with_cache(
        config: AnalysisConfig,
        provider: P,
        cache: PermissionCache,
    ) -> Result<Self, MonitorError> {
        let sampler = Sampler::initialize(config, &provider)?;
        let interval = Duration::from_millis(sampler.config().update_interval_ms);
        log::info!("ToneMeter initialised");
        Ok(Self {
            sessions: CaptureSessionManager::with_cache(provider, cache),
            sampler,
            task: RepeatingTask::new(),
            tick: None,
            state: LoopState::Idle,
            failed: false,
            interval,
            gain: GainSettings::default(),
            preferred_device: None,
            latest: Metrics::default(),
            on_volume_change: None,
            on_tone_detected: None,
        })
    }

    pub fn set_on_volume_change(&mut self, observer: impl FnMut(u8) + 'static) {
        self.on_volume_change = Some(Box::new(observer));
    }

    pub fn set_on_tone_detected(&mut self, observer: impl FnMut(&Metrics) + 'static) {
        self.on_tone_detected = Some(Box::new(observer));
    }

    /// Device to ask for on the next request instead of the cached one.
    pub fn set_preferred_device(&mut self, device_id: Option<String>) {
        self.preferred_device = device_id;
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn status(&self) -> MonitorStatus {
        if self.failed {
            return MonitorStatus::Error;
        }
        match self.state {
            LoopState::Requesting => MonitorStatus::Requesting,
            LoopState::Running => MonitorStatus::Active,
            LoopState::Idle | LoopState::Stopped => MonitorStatus::Inactive,
        }
    }

    /// Clears a sticky error status.
    pub fn clear_error(&mut self) {
        self.failed = false;
    }

    /// Metrics of the most recent tick.
    pub fn latest_metrics(&self) -> &Metrics {
        &self.latest
    }

    pub fn cached_permission(&self) -> Option<bool> {
        self.sessions.cached_permission()
    }

    pub fn sessions(&self) -> &CaptureSessionManager<P> {
        &self.sessions
    }

    pub fn sample_rate(&self) -> u32 {
        self.sampler.sample_rate()
    }

    /// Sets the input volume from a slider percentage (100 = unity).
    pub fn set_input_volume(&mut self, percent: f32) {
        self.gain.set_input_volume(percent);
        self.sampler.set_gain(self.gain.applied());
    }

    /// Sets the microphone boost from a slider percentage (100 = 1.0x).
    pub fn set_mic_boost(&mut self, percent: f32) {
        self.gain.set_mic_boost(percent);
        self.sampler.set_gain(self.gain.applied());
    }

    pub fn gain(&self) -> GainSettings {
        self.gain
    }

    /// Starts analysis, requesting the input device if no session is active.
    ///
    /// Returns `Ok` in `Running` when a session was available immediately,
    /// or in `Requesting` while the host decides. On failure the loop is
    /// back in `Idle` and the error is returned for the user to act on.
    pub fn start(&mut self, now: Instant) -> Result<(), MonitorError> {
        match self.state {
            LoopState::Requesting | LoopState::Running => return Ok(()),
            LoopState::Idle | LoopState::Stopped => {}
        }
        self.failed = false;
        self.state = LoopState::Requesting;
        log::info!("Starting analysis");

        let preferred = self.preferred_device.clone();
        match self.sessions.acquire(preferred.as_deref()) {
            Ok(AcquireStatus::Ready) => self.begin_running(now),
            Ok(AcquireStatus::Pending) => Ok(()),
            Err(e) => Err(self.fail_start(e)),
        }
    }

    /// Host timer entry point.
    ///
    /// Resolves a pending device request and runs the analysis tick when it
    /// is due. Returns the tick's data when one ran. If the input died while
    /// running, the loop drops back to `Idle` with an error status.
    pub fn poll(&mut self, now: Instant) -> Result<Option<TickReport>, MonitorError> {
        if self.sessions.is_pending() {
            match self.sessions.poll_pending() {
                None => {}
                Some(Ok(())) if self.state == LoopState::Requesting => self.begin_running(now)?,
                Some(Ok(())) => log::info!("Input granted after stop, keeping session for later"),
                Some(Err(e)) if self.state == LoopState::Requesting => return Err(self.fail_start(e)),
                Some(Err(e)) => log::info!("Input request failed after stop: {}", e),
            }
        }

        if self.state == LoopState::Running
            && (self.sessions.session().is_none() || !self.sampler.is_attached())
        {
            return Err(self.lose_input());
        }

        if self.state != LoopState::Running || self.task.take_due(now).is_none() {
            return Ok(None);
        }
        self.tick = None;

        let started = Instant::now();
        let report = self.run_tick();
        let next = now + started.elapsed() + self.interval;
        self.tick = Some(self.task.schedule(next));
        Ok(Some(report))
    }

    /// Stops analysis but keeps the capture session for a quick restart.
    pub fn stop(&mut self) {
        self.failed = false;
        match self.state {
            LoopState::Idle | LoopState::Stopped => {}
            LoopState::Requesting => {
                self.state = LoopState::Stopped;
                log::info!("Stopped while waiting for input");
            }
            LoopState::Running => {
                if let Some(handle) = self.tick.take() {
                    self.task.cancel(handle);
                }
                self.sampler.detach();
                self.state = LoopState::Stopped;
                log::info!("Analysis stopped (input stays open)");
            }
        }
    }

    /// Stops analysis and releases the input device.
    pub fn destroy(&mut self) {
        self.stop();
        self.sessions.release();
        self.state = LoopState::Idle;
        self.latest = Metrics::default();
        log::info!("ToneMeter shut down including input");
    }

    fn begin_running(&mut self, now: Instant) -> Result<(), MonitorError> {
        let attached = match self.sessions.session() {
            Some(session) => self.sampler.attach(session),
            None => Err(MonitorError::Attach),
        };
        if let Err(e) = attached {
            return Err(self.fail_start(e));
        }
        self.sampler.set_gain(self.gain.applied());
        self.state = LoopState::Running;
        self.tick = Some(self.task.schedule(now));
        log::info!("Analysis running");
        Ok(())
    }

    fn fail_start(&mut self, error: MonitorError) -> MonitorError {
        log::error!("Start failed: {}", error);
        self.state = LoopState::Idle;
        self.failed = true;
        error
    }

    /// The device went away under a running loop. The user has to start again.
    fn lose_input(&mut self) -> MonitorError {
        if let Some(handle) = self.tick.take() {
            self.task.cancel(handle);
        }
        self.sampler.detach();
        self.sessions.release();
        self.state = LoopState::Idle;
        self.failed = true;
        self.latest = Metrics::default();
        let error = MonitorError::Stream("input stream lost".to_string());
        log::error!("Analysis halted: {}", error);
        error
    }

    fn run_tick(&mut self) -> TickReport {
        let snapshot = self.sampler.sample();
        let metrics = Metrics::extract(&snapshot, self.sampler.sample_rate());

        if let Some(observer) = self.on_volume_change.as_mut() {
            observer(metrics.volume_percent);
        }
        if let Some(observer) = self.on_tone_detected.as_mut() {
            observer(&metrics);
        }

        self.latest = metrics.clone();
        TickReport { metrics, snapshot }
    }
}
