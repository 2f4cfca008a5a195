//! # Main Display Module
//!
//! This module contains the main display components and layout logic
//! for the ToneMeter application.

use iced::widget::{button, column, container, row, slider, text, Space};
use iced::{Alignment, Color, Element, Length};

use crate::widgets::spectrum::SpectrumView;
use crate::{AppDisplayData, Message, StatusLine};

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'static, Message> {
    let title = text("ToneMeter").size(28);

    let main_content = column![
        title,
        Space::with_height(10),
        create_status_line(&data.status),
        Space::with_height(10),
        create_controls(data),
        Space::with_height(10),
        create_readouts(data),
        Space::with_height(10),
        create_spectrum_panel(data),
    ]
    .spacing(5)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// Coloured status indicator text.
fn create_status_line(status: &StatusLine) -> Element<'static, Message> {
    let (label, color) = match status {
        StatusLine::Inactive => ("Stopped".to_string(), Color::from_rgb(0.6, 0.6, 0.6)),
        StatusLine::Requesting => ("Requesting microphone...".to_string(), Color::from_rgb(0.9, 0.75, 0.2)),
        StatusLine::Restoring => ("Restoring connection...".to_string(), Color::from_rgb(0.9, 0.75, 0.2)),
        StatusLine::Active => ("Active - analysing sound".to_string(), Color::from_rgb8(0x00, 0xFF, 0x88)),
        StatusLine::Error(reason) => (format!("Error - {}", reason), Color::from_rgb(0.9, 0.3, 0.3)),
        StatusLine::Unavailable(reason) => (format!("Audio unavailable: {}", reason), Color::from_rgb(0.9, 0.3, 0.3)),
    };
    text(label).size(18).color(color).into()
}

/// Start/stop buttons and the two gain sliders.
fn create_controls(data: &AppDisplayData) -> Element<'static, Message> {
    let available = !matches!(data.status, StatusLine::Unavailable(_));
    let requesting = matches!(data.status, StatusLine::Requesting | StatusLine::Restoring);

    let start = button(text("Start").size(16))
        .on_press_maybe((available && !data.running && !requesting).then_some(Message::Start));
    let stop = button(text("Stop").size(16))
        .on_press_maybe((data.running || requesting).then_some(Message::Stop));

    let input_volume = column![
        text(format!("Input volume: {:.0}%", data.input_volume)).size(14),
        slider(0.0..=200.0, data.input_volume, Message::InputVolumeChanged).step(1.0),
    ]
    .spacing(4)
    .width(Length::FillPortion(1));

    let mic_boost = column![
        text(format!("Mic boost: {:.1}x", data.mic_boost / 100.0)).size(14),
        slider(0.0..=500.0, data.mic_boost, Message::MicBoostChanged).step(10.0),
    ]
    .spacing(4)
    .width(Length::FillPortion(1));

    row![start, stop, Space::with_width(20), input_volume, Space::with_width(10), mic_boost]
        .spacing(10)
        .align_y(Alignment::Center)
        .into()
}

/// Volume, frequency and note readouts.
fn create_readouts(data: &AppDisplayData) -> Element<'static, Message> {
    let readout = |label: &str, value: &str| {
        column![text(label.to_string()).size(14), text(value.to_string()).size(32)]
            .spacing(2)
            .width(Length::FillPortion(1))
    };

    row![
        readout("Volume", &data.volume_text),
        readout("Frequency", &data.frequency_text),
        readout("Note", &data.note_text),
    ]
    .spacing(10)
    .into()
}

/// Creates the spectrum panel widget.
fn create_spectrum_panel(data: &AppDisplayData) -> Element<'static, Message> {
    let spectrum_content = container(SpectrumView::new(data.spectrum.clone(), data.overlay.clone()).view())
        .width(Length::Fill)
        .height(Length::Fill);

    container(
        column![text("Spectrum").size(18), Space::with_height(10), spectrum_content]
            .spacing(5)
            .padding(15),
    )
    .width(Length::Fill)
    .height(Length::Fixed(300.0))
    .into()
}
