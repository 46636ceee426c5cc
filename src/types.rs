use std::time::Instant;

use crate::error::MessageError;

/// Number of keypoints in one hand skeleton.
pub const NUM_LANDMARKS: usize = 21;

/// One raw camera frame in RGBA order.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

/// A compressed frame ready to go out on the socket.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn into_data_url(self) -> String {
        self.data_url
    }
}

/// Normalized keypoint, x and y relative to the frame width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Maps the normalized position onto a `width` x `height` pixel grid.
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Exactly 21 landmarks. Anything else is rejected at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct HandSkeleton {
    landmarks: [Landmark; NUM_LANDMARKS],
}

impl HandSkeleton {
    pub fn landmarks(&self) -> &[Landmark; NUM_LANDMARKS] {
        &self.landmarks
    }

    pub fn landmark(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    /// Mean of all landmark x and y values, in normalized space.
    pub fn centroid(&self) -> (f32, f32) {
        let (sum_x, sum_y) = self
            .landmarks
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), lm| (sx + lm.x, sy + lm.y));
        let n = NUM_LANDMARKS as f32;
        (sum_x / n, sum_y / n)
    }
}

impl TryFrom<Vec<Landmark>> for HandSkeleton {
    type Error = MessageError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        let count = points.len();
        let landmarks: [Landmark; NUM_LANDMARKS] = points
            .try_into()
            .map_err(|_| MessageError::LandmarkCount { hand: 0, count })?;
        Ok(Self { landmarks })
    }
}

/// Decoded inbound result. Any number of hands may be present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultMessage {
    pub hands: Vec<HandSkeleton>,
    pub label: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ResultMessage {
    pub fn primary_hand(&self) -> Option<&HandSkeleton> {
        self.hands.first()
    }
}
