//! # Capture Session Module
//!
//! Acquires and releases the audio input device independently of the
//! analysis loop, so a granted device can be reused across stop/start
//! cycles without asking the host again.
//!
//! Device requests are asynchronous: a provider answers through a
//! single-use channel, which the manager polls from the host loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{CaptureError, MonitorError};

/// How long a recorded permission outcome stays valid.
pub const PERMISSION_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Requested processing for the input. The analysis needs raw samples,
/// so every processing stage is off by default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureConstraints {
    pub device_id: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl CaptureConstraints {
    pub fn raw(device_id: Option<String>) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }
}

/// Answer to a single input request. Exactly one result is sent.
pub type PendingCapture = Receiver<Result<CaptureSession, CaptureError>>;

/// Source of audio input streams.
pub trait CaptureProvider {
    /// Nominal sample rate of the audio subsystem, `None` if there is none.
    fn sample_rate(&self) -> Option<u32>;

    /// Starts an input request. The answer may arrive at any later time.
    fn request_audio_input(&mut self, constraints: &CaptureConstraints) -> PendingCapture;
}

/// A live handle to an audio input.
///
/// Mono sample blocks arrive on `frames`. Dropping the session, or calling
/// [`release`](Self::release), signals the capture side to stop the device.
#[derive(Debug)]
pub struct CaptureSession {
    device_id: Option<String>,
    sample_rate: u32,
    frames: Receiver<Vec<f32>>,
    shutdown: Option<Sender<()>>,
    active: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Wraps a running input.
    ///
    /// `active` is shared with the capture side, which clears it when the
    /// device stream fails.
    pub fn new(
        device_id: Option<String>,
        sample_rate: u32,
        frames: Receiver<Vec<f32>>,
        shutdown: Sender<()>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device_id,
            sample_rate,
            frames,
            shutdown: Some(shutdown),
            active,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> &Receiver<Vec<f32>> {
        &self.frames
    }

    pub fn is_active(&self) -> bool {
        self.shutdown.is_some() && self.active.load(Ordering::SeqCst)
    }

    /// Stops the device stream and marks the session inactive.
    pub fn release(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The capture thread may already be gone if the stream failed.
            let _ = shutdown.try_send(());
            self.active.store(false, Ordering::SeqCst);
            log::info!("Released capture session ({:?})", self.device_id);
        }
    }
}

/// Outcome of the last permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRecord {
    pub granted: bool,
    pub recorded_at: Instant,
}

/// Storage behind the permission cache.
///
/// Writes may fail; the cache treats them as best-effort.
pub trait PermissionStore {
    fn permission(&self) -> Option<PermissionRecord>;
    fn set_permission(&mut self, record: PermissionRecord) -> Result<(), String>;
    fn device_id(&self) -> Option<String>;
    fn set_device_id(&mut self, device_id: String) -> Result<(), String>;
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    permission: Option<PermissionRecord>,
    device_id: Option<String>,
}

impl PermissionStore for MemoryPermissionStore {
    fn permission(&self) -> Option<PermissionRecord> {
        self.permission
    }

    fn set_permission(&mut self, record: PermissionRecord) -> Result<(), String> {
        self.permission = Some(record);
        Ok(())
    }

    fn device_id(&self) -> Option<String> {
        self.device_id.clone()
    }

    fn set_device_id(&mut self, device_id: String) -> Result<(), String> {
        self.device_id = Some(device_id);
        Ok(())
    }
}

/// Remembers the last permission outcome and granted device.
pub struct PermissionCache {
    store: Box<dyn PermissionStore>,
    freshness: Duration,
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(Box::new(MemoryPermissionStore::default()), PERMISSION_FRESHNESS)
    }
}

impl PermissionCache {
    pub fn new(store: Box<dyn PermissionStore>, freshness: Duration) -> Self {
        Self { store, freshness }
    }

    /// Last permission outcome, if it was recorded within the freshness window.
    pub fn permission(&self, now: Instant) -> Option<bool> {
        self.store
            .permission()
            .filter(|record| now.saturating_duration_since(record.recorded_at) < self.freshness)
            .map(|record| record.granted)
    }

    pub fn record_permission(&mut self, granted: bool, now: Instant) {
        let record = PermissionRecord {
            granted,
            recorded_at: now,
        };
        if let Err(e) = self.store.set_permission(record) {
            log::warn!("Could not store permission state: {}", e);
        }
    }

    pub fn device_id(&self) -> Option<String> {
        self.store.device_id()
    }

    pub fn record_device_id(&mut self, device_id: &str) {
        if let Err(e) = self.store.set_device_id(device_id.to_string()) {
            log::warn!("Could not store device id: {}", e);
        }
    }
}

/// Whether a session is usable right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Ready,
    Pending,
}

/// Owns the capture session and the request that may produce one.
pub struct CaptureSessionManager<P> {
    provider: P,
    cache: PermissionCache,
    session: Option<CaptureSession>,
    pending: Option<PendingCapture>,
    requests: usize,
}

impl<P: CaptureProvider> CaptureSessionManager<P> {
    pub fn new(provider: P) -> Self {
        Self::with_cache(provider, PermissionCache::default())
    }

    pub fn with_cache(provider: P, cache: PermissionCache) -> Self {
        Self {
            provider,
            cache,
            session: None,
            pending: None,
            requests: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref().filter(|s| s.is_active())
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of device requests issued so far.
    pub fn request_count(&self) -> usize {
        self.requests
    }

    /// Fresh cached permission outcome, for UI hints before a request.
    pub fn cached_permission(&self) -> Option<bool> {
        self.cache.permission(Instant::now())
    }

    /// Makes an active session available.
    ///
    /// An active session is reused as-is. An in-flight request is never
    /// duplicated. Otherwise a new request goes out for `preferred_device_id`,
    /// or the last granted device.
    pub fn acquire(&mut self, preferred_device_id: Option<&str>) -> Result<AcquireStatus, MonitorError> {
        if self.session().is_some() {
            log::debug!("Reusing active capture session");
            return Ok(AcquireStatus::Ready);
        }
        if let Some(mut stale) = self.session.take() {
            stale.release();
        }
        if self.pending.is_some() {
            return match self.poll_pending() {
                Some(result) => result.map(|_| AcquireStatus::Ready),
                None => Ok(AcquireStatus::Pending),
            };
        }

        let device_id = preferred_device_id
            .map(str::to_string)
            .or_else(|| self.cache.device_id());
        log::info!("Requesting audio input (device: {:?})", device_id);
        let constraints = CaptureConstraints::raw(device_id);
        self.pending = Some(self.provider.request_audio_input(&constraints));
        self.requests += 1;

        match self.poll_pending() {
            Some(result) => result.map(|_| AcquireStatus::Ready),
            None => Ok(AcquireStatus::Pending),
        }
    }

    /// Resolves the in-flight request, if its answer has arrived.
    ///
    /// Returns `None` while there is nothing new to report.
    pub fn poll_pending(&mut self) -> Option<Result<(), MonitorError>> {
        let pending = self.pending.as_ref()?;
        let answer = match pending.try_recv() {
            Ok(answer) => answer,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(CaptureError::Stream("capture request abandoned".to_string()))
            }
        };
        self.pending = None;

        let now = Instant::now();
        match answer {
            Ok(session) => {
                self.cache.record_permission(true, now);
                if let Some(id) = session.device_id() {
                    self.cache.record_device_id(id);
                }
                log::info!("Audio input granted ({:?})", session.device_id());
                self.session = Some(session);
                Some(Ok(()))
            }
            Err(e) => {
                self.cache.record_permission(false, now);
                log::warn!("Audio input request failed: {}", e);
                Some(Err(e.into()))
            }
        }
    }

    /// Releases the session and abandons any in-flight request.
    pub fn release(&mut self) {
        self.pending = None;
        if let Some(mut session) = self.session.take() {
            session.release();
        }
    }
}
