//! Lifecycle tests for the analysis loop, driven by a scripted capture provider.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tonemeter_core::{
    AnalysisConfig, CaptureConstraints, CaptureError, CaptureProvider, CaptureSession, LoopState,
    MagnitudeSnapshot, Metrics, MonitorError, MonitorStatus, PendingCapture, ToneMeter,
};

const SAMPLE_RATE: u32 = 44100;

#[derive(Clone)]
enum Answer {
    Grant,
    Fail(CaptureError),
    Hold,
}

#[derive(Default)]
struct ProviderLog {
    calls: usize,
    constraints: Vec<CaptureConstraints>,
    feeds: Vec<Sender<Vec<f32>>>,
    shutdowns: Vec<Receiver<()>>,
    actives: Vec<Arc<AtomicBool>>,
    held: Vec<Sender<Result<CaptureSession, CaptureError>>>,
}

struct ScriptedProvider {
    answer: Rc<RefCell<Answer>>,
    log: Rc<RefCell<ProviderLog>>,
    sample_rate: Option<u32>,
}

struct Script {
    answer: Rc<RefCell<Answer>>,
    log: Rc<RefCell<ProviderLog>>,
}

impl Script {
    fn answer(&self, answer: Answer) {
        *self.answer.borrow_mut() = answer;
    }

    fn calls(&self) -> usize {
        self.log.borrow().calls
    }

    fn feed(&self, block: Vec<f32>) {
        let log = self.log.borrow();
        log.feeds.last().expect("no session opened").send(block).unwrap();
    }

    /// Simulates the capture side reporting a stream error.
    fn fail_stream(&self) {
        let log = self.log.borrow();
        log.actives.last().expect("no session opened").store(false, Ordering::SeqCst);
    }

    /// Simulates the capture thread exiting and dropping its sender.
    fn hang_up(&self) {
        self.log.borrow_mut().feeds.pop().expect("no session opened");
    }

    fn releases(&self) -> usize {
        self.log.borrow().shutdowns.iter().map(|rx| rx.try_iter().count()).sum()
    }

    fn grant_held(&self) {
        let (session, feed, shutdown, active) = open_session(Some("late-mic".to_string()));
        let mut log = self.log.borrow_mut();
        log.feeds.push(feed);
        log.shutdowns.push(shutdown);
        log.actives.push(active);
        log.held.remove(0).send(Ok(session)).unwrap();
    }
}

fn scripted(answer: Answer) -> (ScriptedProvider, Script) {
    let answer = Rc::new(RefCell::new(answer));
    let log = Rc::new(RefCell::new(ProviderLog::default()));
    let provider = ScriptedProvider {
        answer: answer.clone(),
        log: log.clone(),
        sample_rate: Some(SAMPLE_RATE),
    };
    (provider, Script { answer, log })
}

fn open_session(
    device_id: Option<String>,
) -> (CaptureSession, Sender<Vec<f32>>, Receiver<()>, Arc<AtomicBool>) {
    let (feed, frames) = crossbeam_channel::bounded(64);
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let active = Arc::new(AtomicBool::new(true));
    let session = CaptureSession::new(device_id, SAMPLE_RATE, frames, shutdown_tx, active.clone());
    (session, feed, shutdown_rx, active)
}

impl CaptureProvider for ScriptedProvider {
    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn request_audio_input(&mut self, constraints: &CaptureConstraints) -> PendingCapture {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut log = self.log.borrow_mut();
        log.calls += 1;
        log.constraints.push(constraints.clone());
        match self.answer.borrow().clone() {
            Answer::Grant => {
                let (session, feed, shutdown, active) = open_session(Some("built-in".to_string()));
                log.feeds.push(feed);
                log.shutdowns.push(shutdown);
                log.actives.push(active);
                tx.send(Ok(session)).unwrap();
            }
            Answer::Fail(e) => tx.send(Err(e)).unwrap(),
            Answer::Hold => log.held.push(tx),
        }
        rx
    }
}

fn tone(frequency: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn running_meter() -> (ToneMeter<ScriptedProvider>, Script, Instant) {
    let (provider, script) = scripted(Answer::Grant);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    let now = Instant::now();
    meter.start(now).unwrap();
    (meter, script, now)
}

#[test]
fn init_fails_without_audio_subsystem() {
    let (mut provider, _script) = scripted(Answer::Grant);
    provider.sample_rate = None;

    let result = ToneMeter::new(AnalysisConfig::default(), provider);

    assert!(matches!(result, Err(MonitorError::Init)));
}

#[test]
fn start_runs_first_tick_immediately_and_notifies_both_observers() {
    let (mut meter, _script, now) = running_meter();
    let volumes = Rc::new(RefCell::new(Vec::new()));
    let tones = Rc::new(RefCell::new(Vec::<Metrics>::new()));
    let v = volumes.clone();
    meter.set_on_volume_change(move |volume| v.borrow_mut().push(volume));
    let t = tones.clone();
    meter.set_on_tone_detected(move |metrics| t.borrow_mut().push(metrics.clone()));

    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(meter.status(), MonitorStatus::Active);

    let report = meter.poll(now).unwrap().expect("first tick is due at start");

    assert_eq!(report.snapshot.len(), 1024);
    assert_eq!(volumes.borrow().as_slice(), &[report.metrics.volume_percent]);
    assert_eq!(tones.borrow().as_slice(), &[report.metrics.clone()]);
}

#[test]
fn ticks_are_scheduled_after_the_previous_one_finishes() {
    let (mut meter, _script, now) = running_meter();
    let count = Rc::new(RefCell::new(0));
    let c = count.clone();
    meter.set_on_tone_detected(move |_| *c.borrow_mut() += 1);

    assert!(meter.poll(now).unwrap().is_some());
    assert!(meter.poll(now).unwrap().is_none());
    assert!(meter.poll(now + Duration::from_millis(10)).unwrap().is_none());
    assert!(meter.poll(now + Duration::from_millis(500)).unwrap().is_some());

    assert_eq!(*count.borrow(), 2);
}

#[test]
fn slow_tick_pushes_the_next_one_back() {
    let (mut meter, _script, now) = running_meter();
    meter.set_on_tone_detected(|_| std::thread::sleep(Duration::from_millis(30)));

    assert!(meter.poll(now).unwrap().is_some());

    // Due no earlier than now + 30 ms of work + the 16 ms interval.
    assert!(meter.poll(now + Duration::from_millis(16 + 5)).unwrap().is_none());
    assert!(meter.poll(now + Duration::from_millis(16 + 500)).unwrap().is_some());
}

#[test]
fn stream_error_mid_run_halts_with_error_status() {
    let (mut meter, script, now) = running_meter();
    let tones = Rc::new(RefCell::new(0));
    let t = tones.clone();
    meter.set_on_tone_detected(move |_| *t.borrow_mut() += 1);
    script.feed(tone(440.0, 2048));
    assert_eq!(meter.poll(now).unwrap().unwrap().metrics.note.as_deref(), Some("A4"));

    script.fail_stream();

    assert_eq!(
        meter.poll(now + Duration::from_secs(1)),
        Err(MonitorError::Stream("input stream lost".to_string()))
    );
    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(meter.status(), MonitorStatus::Error);
    assert_eq!(meter.latest_metrics(), &Metrics::default());
    assert_eq!(script.releases(), 1);

    assert!(meter.poll(now + Duration::from_secs(2)).unwrap().is_none());
    assert_eq!(*tones.borrow(), 1);
    assert_eq!(meter.status(), MonitorStatus::Error);

    meter.start(now + Duration::from_secs(3)).unwrap();
    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(meter.status(), MonitorStatus::Active);
    assert_eq!(script.calls(), 2);
}

#[test]
fn hung_up_capture_reads_silent_then_halts() {
    let (mut meter, script, now) = running_meter();
    script.feed(tone(1378.0, 2048));
    assert!(meter.poll(now).unwrap().unwrap().metrics.dominant_frequency_hz > 0);

    script.hang_up();

    let report = meter.poll(now + Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(report.metrics.dominant_frequency_hz, 0);
    assert!(report.snapshot.bins().iter().all(|&b| b == 0));

    assert!(matches!(
        meter.poll(now + Duration::from_secs(2)),
        Err(MonitorError::Stream(_))
    ));
    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(meter.status(), MonitorStatus::Error);
}

#[test]
fn preferred_device_overrides_the_cached_one() {
    let (provider, script) = scripted(Answer::Grant);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    let now = Instant::now();

    meter.set_preferred_device(Some("usb-mic".to_string()));
    meter.start(now).unwrap();
    meter.destroy();
    meter.set_preferred_device(None);
    meter.start(now).unwrap();

    let log = script.log.borrow();
    assert_eq!(log.constraints[0].device_id.as_deref(), Some("usb-mic"));
    assert_eq!(log.constraints[1].device_id.as_deref(), Some("built-in"));
}

#[test]
fn tone_through_the_pipeline_reads_as_a4() {
    let (mut meter, script, now) = running_meter();
    script.feed(tone(440.0, 2048));

    let report = meter.poll(now).unwrap().unwrap();

    assert_eq!(report.metrics.note.as_deref(), Some("A4"));
    assert!(
        (431..=452).contains(&report.metrics.dominant_frequency_hz),
        "got {} Hz",
        report.metrics.dominant_frequency_hz
    );
    assert_eq!(meter.latest_metrics(), &report.metrics);
}

#[test]
fn muted_input_reads_silent() {
    let (mut meter, script, now) = running_meter();
    meter.set_input_volume(0.0);
    script.feed(tone(440.0, 2048));

    let report = meter.poll(now).unwrap().unwrap();

    assert_eq!(report.metrics, Metrics::default());
}

#[test]
fn stop_then_start_reuses_the_session() {
    let (mut meter, script, now) = running_meter();
    meter.poll(now).unwrap();

    meter.stop();
    assert_eq!(meter.state(), LoopState::Stopped);
    assert!(meter.poll(now + Duration::from_secs(1)).unwrap().is_none());

    meter.start(now + Duration::from_secs(2)).unwrap();

    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(script.calls(), 1);
    assert_eq!(script.releases(), 0);
}

#[test]
fn stop_is_a_noop_when_already_stopped() {
    let (mut meter, script, _now) = running_meter();

    meter.stop();
    meter.stop();

    assert_eq!(meter.state(), LoopState::Stopped);
    assert_eq!(script.releases(), 0);
}

#[test]
fn stop_in_idle_stays_idle() {
    let (provider, _script) = scripted(Answer::Grant);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();

    meter.stop();

    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(meter.status(), MonitorStatus::Inactive);
}

#[test]
fn denied_permission_leaves_the_loop_idle() {
    let (provider, script) = scripted(Answer::Fail(CaptureError::PermissionDenied));
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();

    let result = meter.start(Instant::now());

    assert_eq!(result, Err(MonitorError::PermissionDenied));
    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(meter.status(), MonitorStatus::Error);
    assert_eq!(meter.cached_permission(), Some(false));
    assert!(meter.poll(Instant::now()).unwrap().is_none());

    script.answer(Answer::Grant);
    meter.start(Instant::now()).unwrap();
    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(meter.cached_permission(), Some(true));
    assert_eq!(script.calls(), 2);
}

#[test]
fn missing_device_leaves_the_loop_idle() {
    let (provider, _script) = scripted(Answer::Fail(CaptureError::NoDevice));
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();

    assert_eq!(meter.start(Instant::now()), Err(MonitorError::NoDevice));
    assert_eq!(meter.state(), LoopState::Idle);

    meter.clear_error();
    assert_eq!(meter.status(), MonitorStatus::Inactive);
}

#[test]
fn pending_grant_resolves_on_poll() {
    let (provider, script) = scripted(Answer::Hold);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    let now = Instant::now();

    meter.start(now).unwrap();
    assert_eq!(meter.state(), LoopState::Requesting);
    assert_eq!(meter.status(), MonitorStatus::Requesting);
    assert!(meter.poll(now).unwrap().is_none());

    script.grant_held();

    assert!(meter.poll(now).unwrap().is_some());
    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(script.calls(), 1);
}

#[test]
fn pending_failure_surfaces_from_poll() {
    let (provider, script) = scripted(Answer::Hold);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    meter.start(Instant::now()).unwrap();

    let held = script.log.borrow_mut().held.remove(0);
    held.send(Err(CaptureError::PermissionDenied)).unwrap();

    assert_eq!(meter.poll(Instant::now()), Err(MonitorError::PermissionDenied));
    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(meter.status(), MonitorStatus::Error);
}

#[test]
fn grant_after_stop_is_cached_but_does_not_run() {
    let (provider, script) = scripted(Answer::Hold);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    let now = Instant::now();
    meter.start(now).unwrap();

    meter.stop();
    script.grant_held();

    assert!(meter.poll(now).unwrap().is_none());
    assert_eq!(meter.state(), LoopState::Stopped);
    assert!(meter.sessions().session().is_some());

    meter.start(now).unwrap();
    assert_eq!(meter.state(), LoopState::Running);
    assert_eq!(script.calls(), 1);
}

#[test]
fn restart_while_request_is_pending_does_not_ask_again() {
    let (provider, script) = scripted(Answer::Hold);
    let mut meter = ToneMeter::new(AnalysisConfig::default(), provider).unwrap();
    let now = Instant::now();

    meter.start(now).unwrap();
    meter.stop();
    meter.start(now).unwrap();

    assert_eq!(meter.state(), LoopState::Requesting);
    assert_eq!(script.calls(), 1);
}

#[test]
fn destroy_releases_the_session() {
    let (mut meter, script, now) = running_meter();

    meter.destroy();
    meter.destroy();

    assert_eq!(meter.state(), LoopState::Idle);
    assert_eq!(script.releases(), 1);

    meter.start(now).unwrap();
    assert_eq!(script.calls(), 2);
}

#[test]
fn granted_device_is_requested_again_after_teardown() {
    let (mut meter, script, now) = running_meter();
    meter.destroy();
    meter.start(now).unwrap();

    let log = script.log.borrow();
    assert_eq!(log.constraints[0].device_id, None);
    assert_eq!(log.constraints[1].device_id.as_deref(), Some("built-in"));
    assert!(!log.constraints[1].echo_cancellation);
}

#[test]
fn synthetic_tone_block_matches_expected_metrics() {
    let mut bins = vec![0u8; 1024];
    bins[20..=24].iter_mut().for_each(|b| *b = 200);

    let metrics = Metrics::extract(&MagnitudeSnapshot::from_bins(bins), SAMPLE_RATE);

    let mean = 5.0 * 200.0 / 1024.0;
    assert_eq!(metrics.volume_percent, (mean / 255.0 * 100.0_f64).round() as u8);
    assert_eq!(metrics.dominant_frequency_hz, 431);
    assert_eq!(metrics.note.as_deref(), Some("A4"));
}
