use crate::{
    config::OverlayConfig,
    types::{HandSkeleton, NUM_LANDMARKS, ResultMessage},
};

/// Edges drawn between landmarks: thumb, index, middle, ring, pinky, then the palm base.
/// `(0, 5)` appears twice, once as the index root and once as the first palm edge.
pub const HAND_CONNECTIONS: [(usize, usize); 24] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 5),
    (5, 9),
    (9, 13),
    (13, 17),
];

const _: () = {
    let mut i = 0;
    while i < HAND_CONNECTIONS.len() {
        assert!(HAND_CONNECTIONS[i].0 < NUM_LANDMARKS && HAND_CONNECTIONS[i].1 < NUM_LANDMARKS);
        i += 1;
    }
};

pub type Color = [u8; 4];

pub const SKELETON_COLOR: Color = [0, 255, 0, 204];
pub const MARKER_COLOR: Color = [255, 0, 0, 204];
pub const LABEL_FILL: Color = [255, 255, 255, 255];
pub const LABEL_OUTLINE: Color = [0, 0, 0, 255];
pub const LABEL_FONT_SIZE: f32 = 48.0;
pub const LABEL_OUTLINE_WIDTH: f32 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineStyle {
    pub color: Color,
    pub width: f32,
}

/// Text is always anchored at its center, both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub color: Color,
    pub size: f32,
    pub outline_width: f32,
}

/// A 2D drawing target, modelled on a canvas context.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self);
    fn resize(&mut self, width: u32, height: u32);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &LineStyle);
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color);
    fn stroke_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle);
    fn fill_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle);
}

/// What one render pass produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderOutcome {
    pub segments: usize,
    pub markers: usize,
    /// Pixel position the label was centered at, when it was drawn on the overlay.
    pub label_at: Option<(f32, f32)>,
    /// Label with no hand to anchor it; the caller shows it as plain text.
    pub text_label: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    line: LineStyle,
    marker_radius: f32,
    label_offset: f32,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            line: LineStyle {
                color: SKELETON_COLOR,
                width: config.line_width,
            },
            marker_radius: config.marker_radius,
            label_offset: config.label_offset,
        }
    }

    /// Redraws `surface` from scratch for `message`, sized to the video's native
    /// `video_size`. Every hand is drawn; the label sits above the first one.
    pub fn render<S: Surface>(
        &self,
        surface: &mut S,
        message: &ResultMessage,
        video_size: (u32, u32),
    ) -> RenderOutcome {
        surface.clear();
        surface.resize(video_size.0, video_size.1);
        let (width, height) = (surface.width(), surface.height());

        let mut outcome = RenderOutcome::default();
        for hand in &message.hands {
            let (segments, markers) = self.draw_hand(surface, hand, width, height);
            outcome.segments += segments;
            outcome.markers += markers;
        }

        match (message.primary_hand(), message.label.as_deref()) {
            (Some(hand), Some(label)) => {
                let (cx, cy) = hand.centroid();
                let at = (cx * width as f32, cy * height as f32 - self.label_offset);
                let outline = TextStyle {
                    color: LABEL_OUTLINE,
                    size: LABEL_FONT_SIZE,
                    outline_width: LABEL_OUTLINE_WIDTH,
                };
                let fill = TextStyle {
                    color: LABEL_FILL,
                    ..outline
                };
                surface.stroke_text(label, at, &outline);
                surface.fill_text(label, at, &fill);
                outcome.label_at = Some(at);
            }
            (None, Some(label)) => outcome.text_label = Some(label.to_string()),
            _ => {}
        }

        outcome
    }

    fn draw_hand<S: Surface>(
        &self,
        surface: &mut S,
        hand: &HandSkeleton,
        width: u32,
        height: u32,
    ) -> (usize, usize) {
        let points = hand.landmarks().map(|lm| lm.to_pixel(width, height));

        for &(a, b) in &HAND_CONNECTIONS {
            surface.stroke_line(points[a], points[b], &self.line);
        }
        for &point in &points {
            surface.fill_circle(point, self.marker_radius, MARKER_COLOR);
        }

        (HAND_CONNECTIONS.len(), points.len())
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(&OverlayConfig::default())
    }
}
