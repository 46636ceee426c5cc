use fast_image_resize as fir;
use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use rayon::prelude::*;

use crate::{
    config::CaptureConfig,
    error::EncodeError,
    protocol,
    types::{EncodedFrame, Frame},
};

/// Turns raw frames into bounded-size JPEG data URLs.
#[derive(Clone, Debug)]
pub struct FrameEncoder {
    quality: u8,
    max_width: u32,
    max_height: u32,
}

impl FrameEncoder {
    /// `quality` is in (0, 1], the same scale as a browser canvas export.
    pub fn new(quality: f32, max_width: u32, max_height: u32) -> Self {
        Self {
            quality: (quality * 100.0).round().clamp(1.0, 100.0) as u8,
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.jpeg_quality, config.max_width, config.max_height)
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.quality
    }

    /// Output size for a `width` x `height` input: unchanged when it already fits,
    /// otherwise scaled down uniformly until both sides fit.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width && height <= self.max_height {
            return (width, height);
        }
        let scale = (self.max_width as f32 / width as f32)
            .min(self.max_height as f32 / height as f32);
        let new_w = (width as f32 * scale).round().max(1.0) as u32;
        let new_h = (height as f32 * scale).round().max(1.0) as u32;
        (new_w.min(self.max_width), new_h.min(self.max_height))
    }

    pub fn encode(&self, frame: &Frame) -> Result<EncodedFrame, EncodeError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(EncodeError::EmptyFrame);
        }
        let expected = frame.expected_len();
        if frame.rgba.len() != expected {
            return Err(EncodeError::BufferMismatch {
                got: frame.rgba.len(),
                expected,
            });
        }

        let rgb = rgba_to_rgb(&frame.rgba);
        let (width, height) = self.target_size(frame.width, frame.height);
        let rgb = if (width, height) == (frame.width, frame.height) {
            rgb
        } else {
            resize_rgb(rgb, frame.width, frame.height, width, height)?
        };

        let mut jpeg = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            &rgb,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(EncodedFrame {
            data_url: protocol::jpeg_data_url(&jpeg),
            width,
            height,
        })
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = vec![0u8; rgba.len() / 4 * 3];
    rgb.par_chunks_exact_mut(3)
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(dst, src)| dst.copy_from_slice(&src[..3]));
    rgb
}

fn resize_rgb(
    rgb: Vec<u8>,
    width: u32,
    height: u32,
    new_w: u32,
    new_h: u32,
) -> Result<Vec<u8>, EncodeError> {
    let src_image = fir::images::Image::from_vec_u8(width, height, rgb, fir::PixelType::U8x3)
        .map_err(|err| EncodeError::Resize(err.to_string()))?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x3);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|err| EncodeError::Resize(err.to_string()))?;
    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[200, 40, 90, 255]);
        }
        Frame::new(rgba, width, height)
    }

    #[test]
    fn quality_maps_to_jpeg_scale() {
        assert_eq!(FrameEncoder::default().jpeg_quality(), 50);
        assert_eq!(FrameEncoder::new(0.0, 10, 10).jpeg_quality(), 1);
        assert_eq!(FrameEncoder::new(1.0, 10, 10).jpeg_quality(), 100);
    }

    #[test]
    fn target_size_keeps_aspect_within_bounds() {
        let encoder = FrameEncoder::default();
        assert_eq!(encoder.target_size(640, 480), (640, 480));
        assert_eq!(encoder.target_size(320, 240), (320, 240));
        assert_eq!(encoder.target_size(1280, 720), (640, 360));
        assert_eq!(encoder.target_size(1920, 1080), (640, 360));
        assert_eq!(encoder.target_size(480, 960), (240, 480));
    }

    #[test]
    fn encodes_jpeg_data_url_at_capture_size() {
        let encoded = FrameEncoder::default().encode(&solid_frame(64, 48)).unwrap();
        assert_eq!((encoded.width, encoded.height), (64, 48));
        let jpeg = protocol::parse_jpeg_data_url(&encoded.data_url).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn large_frames_are_downscaled() {
        let encoded = FrameEncoder::default().encode(&solid_frame(1280, 960)).unwrap();
        assert_eq!((encoded.width, encoded.height), (640, 480));
        let jpeg = protocol::parse_jpeg_data_url(&encoded.data_url).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
    }

    #[test]
    fn rejects_inconsistent_buffers() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(matches!(
            FrameEncoder::default().encode(&frame),
            Err(EncodeError::BufferMismatch { got: 10, expected: 64 })
        ));
        let empty = Frame::new(Vec::new(), 0, 4);
        assert!(matches!(
            FrameEncoder::default().encode(&empty),
            Err(EncodeError::EmptyFrame)
        ));
    }
}
