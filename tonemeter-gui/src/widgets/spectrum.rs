//! # Spectrum Widget
//!
//! Draws the latest magnitude snapshot as one bar per frequency bin, with
//! the volume/frequency/note overlay in the top-left corner.

use iced::widget::canvas::{self, Geometry, Path};
use iced::widget::container;
use iced::{mouse, Color, Element, Pixels, Point, Rectangle, Renderer, Size, Theme};

const BACKGROUND: Color = Color::from_rgb(0.0, 0x11 as f32 / 255.0, 0x22 as f32 / 255.0);
const BAR_COLOR: Color = Color::from_rgb(0.0, 0x88 as f32 / 255.0, 1.0);
const OVERLAY_COLOR: Color = Color::from_rgb(0.0, 1.0, 0x88 as f32 / 255.0);

pub struct SpectrumView {
    /// Byte magnitudes, one per bin.
    bins: Vec<u8>,
    overlay: String,
}

impl SpectrumView {
    pub fn new(bins: Vec<u8>, overlay: String) -> Self {
        Self { bins, overlay }
    }

    pub fn view(self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self)
                .width(iced::Length::Fill)
                .height(iced::Length::Fill),
        )
        .into()
    }
}

impl<Message> canvas::Program<Message> for SpectrumView {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        if !bounds.width.is_finite() || !bounds.height.is_finite() {
            return vec![frame.into_geometry()];
        }

        frame.fill_rectangle(Point::ORIGIN, bounds.size(), BACKGROUND);

        if !self.bins.is_empty() {
            let bar_width = (bounds.width / self.bins.len() as f32).max(1.0);
            for (i, &magnitude) in self.bins.iter().enumerate() {
                let height = magnitude as f32 / 255.0 * bounds.height;
                let x = i as f32 * bar_width;
                if height > 0.0 && x < bounds.width {
                    let bar = Path::rectangle(
                        Point::new(x, bounds.height - height),
                        Size::new(bar_width, height),
                    );
                    frame.fill(&bar, BAR_COLOR);
                }
            }
        }

        frame.fill_text(canvas::Text {
            content: self.overlay.clone(),
            position: Point::new(10.0, 10.0),
            color: OVERLAY_COLOR,
            size: Pixels(14.0),
            font: iced::Font::MONOSPACE,
            ..canvas::Text::default()
        });

        vec![frame.into_geometry()]
    }
}
