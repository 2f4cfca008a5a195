//! # ToneMeter - Live Microphone Monitor GUI
//!
//! This module contains the main GUI application for ToneMeter.
//! It binds the headless analysis loop from `tonemeter-core` to widgets:
//! start/stop controls, gain sliders, a status line, volume/frequency/note
//! readouts and the spectrum view.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme, owns the `ToneMeter`
//! - **Capture Thread**: Owned by the CPAL provider, feeds sample blocks
//! - **Communication**: Monitor callbacks forward events over a crossbeam channel
//! - **Updates**: 16 ms subscription acts as the host timer for `ToneMeter::poll`

mod ui;
mod widgets;

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use iced::{Element, Subscription, Theme};
use tonemeter_core::audio::CpalCaptureProvider;
use tonemeter_core::{AnalysisConfig, Metrics, MonitorStatus, ToneMeter};
use ui::main_display::create_main_view;

/// Optional analysis config next to the working directory.
const CONFIG_PATH: &str = "tonemeter.json";

/// Host timer period driving the monitor and redraws.
const HOST_TICK_MS: u64 = 16;

/// Main entry point for the ToneMeter application.
pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting ToneMeter...");
    let result = iced::application("ToneMeter", ToneMeterApp::update, ToneMeterApp::view)
        .subscription(ToneMeterApp::subscription)
        .theme(ToneMeterApp::theme)
        .run();
    log::info!("Application finished with result: {:?}", result);
    result
}

/// Application message types for the Iced GUI framework.
#[derive(Debug, Clone)]
pub enum Message {
    Start,
    Stop,
    InputVolumeChanged(f32),
    MicBoostChanged(f32),

    // Continuous update message
    Tick,
}

/// Events forwarded from the monitor's observer callbacks.
#[derive(Debug, Clone)]
enum UiEvent {
    Volume(u8),
    Tone(Metrics),
}

/// What the status indicator shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    Inactive,
    Requesting,
    Restoring,
    Active,
    Error(String),
    /// No audio subsystem; the monitor could not be created.
    Unavailable(String),
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub status: StatusLine,
    pub running: bool,
    pub volume_text: String,
    pub frequency_text: String,
    pub note_text: String,
    pub input_volume: f32,
    pub mic_boost: f32,
    pub spectrum: Vec<u8>,
    pub overlay: String,
}

impl AppDisplayData {
    fn reset_readouts(&mut self) {
        self.volume_text = "0%".to_string();
        self.frequency_text = "0 Hz".to_string();
        self.note_text = "---".to_string();
        self.spectrum.clear();
        self.overlay = Metrics::default().to_string();
    }
}

struct ToneMeterApp {
    meter: Option<ToneMeter<CpalCaptureProvider>>,
    events: Receiver<UiEvent>,
    restoring: bool,
    last_error: Option<String>,

    // Single source of truth for all display data
    display_data: AppDisplayData,
}

impl Default for ToneMeterApp {
    fn default() -> Self {
        let config = load_config_or_default(CONFIG_PATH);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let (meter, status) = match ToneMeter::new(config, CpalCaptureProvider::new()) {
            Ok(mut meter) => {
                bind_observers(&mut meter, events_tx);
                (Some(meter), StatusLine::Inactive)
            }
            Err(e) => {
                log::error!("ToneMeter unavailable: {}", e);
                (None, StatusLine::Unavailable(e.to_string()))
            }
        };

        let mut display_data = AppDisplayData {
            status,
            running: false,
            volume_text: String::new(),
            frequency_text: String::new(),
            note_text: String::new(),
            input_volume: 100.0,
            mic_boost: 100.0,
            spectrum: Vec::new(),
            overlay: String::new(),
        };
        display_data.reset_readouts();

        Self {
            meter,
            events: events_rx,
            restoring: false,
            last_error: None,
            display_data,
        }
    }
}

impl Drop for ToneMeterApp {
    fn drop(&mut self) {
        if let Some(meter) = self.meter.as_mut() {
            meter.destroy();
        }
    }
}

/// Forwards both monitor callbacks into the GUI's event channel.
fn bind_observers(meter: &mut ToneMeter<CpalCaptureProvider>, events: Sender<UiEvent>) {
    let volume_tx = events.clone();
    meter.set_on_volume_change(move |volume| {
        let _ = volume_tx.send(UiEvent::Volume(volume));
    });
    meter.set_on_tone_detected(move |metrics| {
        let _ = events.send(UiEvent::Tone(metrics.clone()));
    });
}

impl ToneMeterApp {
    fn update(&mut self, message: Message) {
        match message {
            Message::Start => self.start(),
            Message::Stop => {
                if let Some(meter) = self.meter.as_mut() {
                    meter.stop();
                    self.last_error = None;
                    self.display_data.reset_readouts();
                    // Drop readings from the last tick before the stop.
                    self.events.try_iter().for_each(drop);
                }
            }
            Message::InputVolumeChanged(value) => {
                self.display_data.input_volume = value;
                if let Some(meter) = self.meter.as_mut() {
                    meter.set_input_volume(value);
                }
            }
            Message::MicBoostChanged(value) => {
                self.display_data.mic_boost = value;
                if let Some(meter) = self.meter.as_mut() {
                    meter.set_mic_boost(value);
                }
            }
            Message::Tick => self.poll_meter(),
        }
        self.refresh_status();
    }

    fn start(&mut self) {
        let Some(meter) = self.meter.as_mut() else {
            return;
        };
        self.restoring = meter.cached_permission() == Some(true);
        self.last_error = None;

        meter.set_input_volume(self.display_data.input_volume);
        meter.set_mic_boost(self.display_data.mic_boost);
        if let Err(e) = meter.start(Instant::now()) {
            self.last_error = Some(e.to_string());
        }
    }

    fn poll_meter(&mut self) {
        let Some(meter) = self.meter.as_mut() else {
            return;
        };
        match meter.poll(Instant::now()) {
            Ok(Some(report)) => {
                self.display_data.spectrum = report.snapshot.bins().to_vec();
                self.display_data.overlay = report.metrics.to_string();
            }
            Ok(None) => {}
            Err(e) => {
                self.last_error = Some(e.to_string());
                if !meter.is_running() {
                    self.display_data.reset_readouts();
                    self.events.try_iter().for_each(drop);
                }
            }
        }

        let events: Vec<UiEvent> = self.events.try_iter().collect();
        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Volume(volume) => {
                self.display_data.volume_text = format!("{}%", volume);
            }
            UiEvent::Tone(metrics) => {
                self.display_data.frequency_text = format!("{} Hz", metrics.dominant_frequency_hz);
                self.display_data.note_text = metrics.note.unwrap_or_else(|| "---".to_string());
            }
        }
    }

    fn refresh_status(&mut self) {
        let Some(meter) = self.meter.as_ref() else {
            return;
        };
        self.display_data.running = meter.is_running();
        self.display_data.status = match meter.status() {
            MonitorStatus::Inactive => StatusLine::Inactive,
            MonitorStatus::Requesting if self.restoring => StatusLine::Restoring,
            MonitorStatus::Requesting => StatusLine::Requesting,
            MonitorStatus::Active => StatusLine::Active,
            MonitorStatus::Error => StatusLine::Error(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| "allow microphone access".to_string()),
            ),
        };
    }

    /// Renders the main application interface.
    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    /// Host timer driving `ToneMeter::poll` and redraws.
    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(std::time::Duration::from_millis(HOST_TICK_MS)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Loads the analysis config from `path`, falling back to defaults.
///
/// A missing file is normal; an unreadable or invalid one is logged.
fn load_config_or_default(path: &str) -> AnalysisConfig {
    if !Path::new(path).exists() {
        return AnalysisConfig::default();
    }
    match load_config(path) {
        Ok(config) => {
            log::info!("Loaded analysis config from {}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring {}: {:#}", path, e);
            AnalysisConfig::default()
        }
    }
}

fn load_config(path: &str) -> anyhow::Result<AnalysisConfig> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let config: AnalysisConfig =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path))?;
    config.validate()?;
    Ok(config)
}
