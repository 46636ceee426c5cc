//! Wire format shared with the inference service.
//!
//! Outbound: one text frame per capture tick holding a `data:image/jpeg;base64,...` URL.
//! Inbound: one JSON text frame per result with the optional fields
//! `multiHandLandmarks`, `resultData`, `message` and `error`.

use base64::Engine;
use serde::Deserialize;

use crate::{
    error::MessageError,
    types::{HandSkeleton, Landmark, ResultMessage},
};

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
    let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + encoded.len());
    url.push_str(JPEG_DATA_URL_PREFIX);
    url.push_str(&encoded);
    url
}

/// Reverses [`jpeg_data_url`]. Returns `None` for anything that is not a base64 JPEG URL.
pub fn parse_jpeg_data_url(url: &str) -> Option<Vec<u8>> {
    let payload = url.strip_prefix(JPEG_DATA_URL_PREFIX)?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    multi_hand_landmarks: Option<Vec<Vec<WireLandmark>>>,
    #[serde(default)]
    result_data: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLandmark {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

/// Parses and validates one inbound result.
///
/// The whole message is rejected if any hand does not carry exactly 21 finite landmarks,
/// or if the object has none of the recognized fields. An empty label counts as no label.
pub fn decode_result(raw: &str) -> Result<ResultMessage, MessageError> {
    let wire: WireResult = serde_json::from_str(raw)?;

    if wire.multi_hand_landmarks.is_none()
        && wire.result_data.is_none()
        && wire.message.is_none()
        && wire.error.is_none()
    {
        return Err(MessageError::NoRecognizedFields);
    }

    let hands = wire
        .multi_hand_landmarks
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(hand, points)| {
            let points: Vec<Landmark> = points
                .into_iter()
                .map(|p| Landmark::new(p.x, p.y, p.z))
                .collect();
            if points
                .iter()
                .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
            {
                return Err(MessageError::NonFiniteLandmark { hand });
            }
            HandSkeleton::try_from(points).map_err(|err| match err {
                MessageError::LandmarkCount { count, .. } => {
                    MessageError::LandmarkCount { hand, count }
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResultMessage {
        hands,
        label: wire.result_data.filter(|label| !label.is_empty()),
        message: wire.message,
        error: wire.error,
    })
}
