use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no camera frame available yet")]
    NoFrameYet,
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera stream stopped")]
    StreamStopped,
}

impl CaptureError {
    /// Expected while the camera warms up; not worth a warning.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::NoFrameYet)
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer size mismatch: got {got}, expected {expected}")]
    BufferMismatch { got: usize, expected: usize },
    #[error("frame has zero area")]
    EmptyFrame,
    #[error("resize failed: {0}")]
    Resize(String),
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload carries none of the recognized fields")]
    NoRecognizedFields,
    #[error("hand {hand} has {count} landmarks, expected 21")]
    LandmarkCount { hand: usize, count: usize },
    #[error("hand {hand} has a non-finite landmark")]
    NonFiniteLandmark { hand: usize },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket is not open")]
    NotOpen,
    #[error("outbound slot busy, frame dropped")]
    Backpressure,
    #[error("failed to start socket worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid endpoint {0:?}: expected a plain ws:// url")]
    InvalidEndpoint(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
