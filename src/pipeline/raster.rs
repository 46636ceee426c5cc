use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, Rgba, RgbaImage};

use super::{
    glyphs::{self, GLYPH_HEIGHT, GLYPH_WIDTH},
    overlay::{Color, LineStyle, Surface, TextStyle},
};

/// Transparent RGBA canvas the overlay is rasterized into.
#[derive(Clone, Debug, Default)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.buffer
            .get(idx..idx + 4)
            .and_then(|px| px.try_into().ok())
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(self.width, self.height, self.buffer.clone())
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = self
            .to_image()
            .ok_or_else(|| anyhow!("overlay buffer does not match {}x{}", self.width, self.height))?;
        image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write overlay snapshot {}", path.display()))
    }

    fn draw_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle, grow: i64) {
        let Some((cx, cy)) = pixel_center(center) else {
            return;
        };
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return;
        }
        let cell = (style.size / GLYPH_HEIGHT as f32).round().max(1.0) as i64;
        let advance = (i64::from(GLYPH_WIDTH) + 1) * cell;
        let text_w = advance * chars.len() as i64 - cell;
        let text_h = i64::from(GLYPH_HEIGHT) * cell;
        let left = cx - text_w / 2;
        let top = cy - text_h / 2;
        if top + text_h + grow < 0 || top - grow >= i64::from(self.height) {
            return;
        }

        for (i, c) in chars.into_iter().enumerate() {
            let origin_x = left + advance * i as i64;
            if origin_x - grow >= i64::from(self.width) {
                break;
            }
            if origin_x + advance + grow < 0 {
                continue;
            }
            for (col, row) in glyphs::lit_cells(c) {
                let x = origin_x + i64::from(col) * cell;
                let y = top + i64::from(row) * cell;
                fill_rect(
                    &mut self.buffer,
                    self.width,
                    self.height,
                    (x - grow, y - grow),
                    (x + cell + grow, y + cell + grow),
                    style.color,
                );
            }
        }
    }
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.buffer.fill(0);
    }

    fn resize(&mut self, width: u32, height: u32) {
        // Matches canvas semantics: a resize always leaves a blank surface.
        self.width = width;
        self.height = height;
        self.buffer.clear();
        self.buffer.resize(width as usize * height as usize * 4, 0);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), style: &LineStyle) {
        draw_line(
            &mut self.buffer,
            self.width,
            self.height,
            from,
            to,
            style.color,
            style.width.round() as i64,
        );
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
        let Some(center) = pixel_center(center) else {
            return;
        };
        draw_circle(
            &mut self.buffer,
            self.width,
            self.height,
            center,
            radius.round().clamp(0.0, COORD_LIMIT as f32) as i64,
            color,
        );
    }

    fn stroke_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle) {
        let grow = (style.outline_width / 2.0).ceil().max(0.0) as i64;
        self.draw_text(text, center, style, grow);
    }

    fn fill_text(&mut self, text: &str, center: (f32, f32), style: &TextStyle) {
        self.draw_text(text, center, style, 0);
    }
}

// Anything this far outside the surface is dropped before it reaches integer math.
const COORD_LIMIT: f64 = 1.0e9;

fn pixel_center(point: (f32, f32)) -> Option<(i64, i64)> {
    let (x, y) = (f64::from(point.0), f64::from(point.1));
    if !(x.abs() <= COORD_LIMIT && y.abs() <= COORD_LIMIT) {
        return None;
    }
    Some((x.round() as i64, y.round() as i64))
}

/// Liang-Barsky clip of `p0 -> p1` to the box `min..=max`. `None` when the segment
/// misses the box or has a non-finite endpoint.
fn clip_segment(
    p0: (f32, f32),
    p1: (f32, f32),
    min: (f64, f64),
    max: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (x0, y0) = (f64::from(p0.0), f64::from(p0.1));
    let (x1, y1) = (f64::from(p1.0), f64::from(p1.1));
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (dx, dy) = (x1 - x0, y1 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x0 - min.0),
        (dx, max.0 - x0),
        (-dy, y0 - min.1),
        (dy, max.1 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let start = if t0 > 0.0 { (x0 + t0 * dx, y0 + t0 * dy) } else { (x0, y0) };
    let end = if t1 < 1.0 { (x0 + t1 * dx, y0 + t1 * dy) } else { (x1, y1) };
    Some((start, end))
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: Color,
    thickness: i64,
) {
    let radius = (thickness.max(1) - 1) / 2;
    let margin = radius as f64 + 1.0;
    let Some((start, end)) = clip_segment(
        p0,
        p1,
        (-margin, -margin),
        (f64::from(width) + margin, f64::from(height) + margin),
    ) else {
        return;
    };

    let (mut x0, mut y0) = (start.0 as i64, start.1 as i64);
    let (x1, y1) = (end.0 as i64, end.1 as i64);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                    put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i64, i64),
    radius: i64,
    color: Color,
) {
    let (cx, cy) = center;
    let rows = (cy - radius).max(0)..=(cy + radius).min(i64::from(height) - 1);
    let cols = (cx - radius).max(0)..=(cx + radius).min(i64::from(width) - 1);
    for y in rows {
        for x in cols.clone() {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, x, y, color);
            }
        }
    }
}

// Half-open: covers [min, max).
fn fill_rect(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    min: (i64, i64),
    max: (i64, i64),
    color: Color,
) {
    for y in min.1.max(0)..max.1.min(i64::from(height)) {
        for x in min.0.max(0)..max.0.min(i64::from(width)) {
            put_pixel_safe(buffer, width, height, x, y, color);
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i64, y: i64, color: Color) {
    if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
        return;
    }
    let idx = (y as usize * width as usize + x as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::overlay::{LABEL_FILL, LABEL_OUTLINE, MARKER_COLOR, OverlayRenderer, SKELETON_COLOR},
        testing::{skeleton_at, skeleton_from},
        types::{Landmark, NUM_LANDMARKS, ResultMessage},
    };

    const RED: Color = [255, 0, 0, 255];

    #[test]
    fn resize_blanks_the_canvas() {
        let mut surface = RasterSurface::new(4, 4);
        surface.fill_circle((1.0, 1.0), 1.0, RED);
        surface.resize(8, 2);
        assert_eq!(surface.pixels().len(), 8 * 2 * 4);
        assert!(surface.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn line_covers_both_endpoints_and_clips() {
        let mut surface = RasterSurface::new(10, 10);
        let style = LineStyle { color: RED, width: 1.0 };
        surface.stroke_line((1.0, 1.0), (8.0, 5.0), &style);
        assert_eq!(surface.pixel(1, 1), Some(RED));
        assert_eq!(surface.pixel(8, 5), Some(RED));

        surface.stroke_line((-5.0, -5.0), (20.0, 20.0), &style);
        assert_eq!(surface.pixel(9, 9), Some(RED));
    }

    #[test]
    fn circle_respects_radius() {
        let mut surface = RasterSurface::new(20, 20);
        surface.fill_circle((10.0, 10.0), 4.0, RED);
        assert_eq!(surface.pixel(10, 6), Some(RED));
        assert_eq!(surface.pixel(14, 10), Some(RED));
        assert_eq!(surface.pixel(13, 13), Some([0, 0, 0, 0]));
    }

    #[test]
    fn text_fill_sits_inside_outline() {
        let mut surface = RasterSurface::new(100, 100);
        let outline = TextStyle { color: LABEL_OUTLINE, size: 7.0, outline_width: 2.0 };
        let fill = TextStyle { color: LABEL_FILL, ..outline };
        surface.stroke_text("-", (50.0, 50.0), &outline);
        surface.fill_text("-", (50.0, 50.0), &fill);

        // "-" at cell size 1 spans x in [48, 53), row 3 of 7 => y = 47 + 3.
        assert_eq!(surface.pixel(50, 50), Some(LABEL_FILL));
        assert_eq!(surface.pixel(50, 49), Some(LABEL_OUTLINE));
        assert_eq!(surface.pixel(47, 50), Some(LABEL_OUTLINE));
        assert_eq!(surface.pixel(50, 45), Some([0, 0, 0, 0]));
    }

    #[test]
    fn renders_overlay_pixels_at_landmarks() {
        let mut surface = RasterSurface::default();
        let message = ResultMessage {
            hands: vec![skeleton_at(0.5, 0.5)],
            label: Some("A".to_string()),
            ..Default::default()
        };
        OverlayRenderer::default().render(&mut surface, &message, (640, 480));

        assert_eq!((surface.width(), surface.height()), (640, 480));
        assert_eq!(surface.pixel(320, 240), Some(MARKER_COLOR));
        assert_ne!(surface.pixel(320, 190), Some([0, 0, 0, 0]));
        assert_ne!(surface.pixel(320, 190), Some(SKELETON_COLOR));

        let image = surface.to_image().unwrap();
        assert_eq!(image.dimensions(), (640, 480));
    }

    #[test]
    fn far_out_landmarks_are_clipped_not_overflowed() {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); NUM_LANDMARKS];
        points[0] = Landmark::new(-1.0e10, 0.5, 0.0);
        points[1] = Landmark::new(1.0e10, 0.5, 0.0);
        points[8] = Landmark::new(1.0e7, -1.0e7, 0.0);
        let message = ResultMessage {
            hands: vec![skeleton_from(points)],
            label: Some("A".to_string()),
            ..Default::default()
        };

        let mut surface = RasterSurface::default();
        OverlayRenderer::default().render(&mut surface, &message, (640, 480));

        // Edge 0-1 crosses the whole surface along the centre row.
        assert_eq!(surface.pixel(5, 240), Some(SKELETON_COLOR));
        assert_eq!(surface.pixel(635, 240), Some(SKELETON_COLOR));
        assert_eq!(surface.pixel(320, 240), Some(MARKER_COLOR));
    }

    #[test]
    fn off_surface_primitives_draw_nothing() {
        let mut surface = RasterSurface::new(16, 16);
        let line = LineStyle { color: RED, width: 3.0 };
        let text = TextStyle { color: RED, size: 48.0, outline_width: 3.0 };

        surface.stroke_line((f32::INFINITY, 0.0), (4.0, 4.0), &line);
        surface.stroke_line((f32::NAN, 1.0), (4.0, 4.0), &line);
        surface.stroke_line((-1.0e30, -50.0), (1.0e30, -50.0), &line);
        surface.fill_circle((f32::MAX, 8.0), 4.0, RED);
        surface.fill_circle((8.0, 1.0e12), 4.0, RED);
        surface.stroke_text("HELLO", (1.0e30, 1.0e30), &text);
        surface.fill_text("HELLO", (-1.0e8, 8.0), &text);

        assert!(surface.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn clipping_keeps_inside_segments_exact() {
        let clipped = clip_segment((1.0, 2.0), (8.0, 5.0), (0.0, 0.0), (10.0, 10.0));
        assert_eq!(clipped, Some(((1.0, 2.0), (8.0, 5.0))));

        let clipped = clip_segment((-10.0, 5.0), (30.0, 5.0), (0.0, 0.0), (10.0, 10.0));
        assert_eq!(clipped, Some(((0.0, 5.0), (10.0, 5.0))));

        assert_eq!(
            clip_segment((-5.0, -5.0), (-1.0, 20.0), (0.0, 0.0), (10.0, 10.0)),
            None
        );
    }
}
