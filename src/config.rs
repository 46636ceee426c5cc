use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "asl-stream.toml";
pub const ENV_PREFIX: &str = "ASL_STREAM";

/// Runtime configuration. Every field has a default, so an empty file is valid.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub reconnect: ReconnectConfig,
    pub overlay: OverlayConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub fps: u32,
    pub jpeg_quality: f32,
    pub max_width: u32,
    pub max_height: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub delay_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub marker_radius: f32,
    pub line_width: f32,
    pub label_offset: f32,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9000/asl".to_string(),
            capture: CaptureConfig::default(),
            camera: CameraConfig::default(),
            reconnect: ReconnectConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            jpeg_quality: 0.5,
            max_width: 640,
            max_height: 480,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 3_000,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            marker_radius: 4.0,
            line_width: 2.0,
            label_offset: 50.0,
            snapshot_path: None,
        }
    }
}

impl CaptureConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl AppConfig {
    /// Layers defaults, an optional TOML file and `ASL_STREAM__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let loaded: AppConfig = config::Config::builder()
            .add_source(config::File::from(file.to_path_buf()).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // The transport is built without TLS, so wss:// could never open.
        if !self.endpoint.starts_with("ws://") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.capture.fps == 0 || self.capture.fps > 1_000 {
            return Err(ConfigError::Invalid {
                key: "capture.fps",
                reason: format!("{} is outside 1..=1000", self.capture.fps),
            });
        }
        let quality = self.capture.jpeg_quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "capture.jpeg_quality",
                reason: format!("{quality} is outside (0, 1]"),
            });
        }
        if self.capture.max_width == 0 || self.capture.max_height == 0 {
            return Err(ConfigError::Invalid {
                key: "capture.max_width/max_height",
                reason: "bounds must be non-zero".to_string(),
            });
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid {
                key: "camera.width/height",
                reason: "ideal resolution must be non-zero".to_string(),
            });
        }
        let overlay = &self.overlay;
        let radius_ok = overlay.marker_radius.is_finite() && overlay.marker_radius >= 0.0;
        let width_ok = overlay.line_width.is_finite() && overlay.line_width > 0.0;
        if !(radius_ok && width_ok) {
            return Err(ConfigError::Invalid {
                key: "overlay",
                reason: "marker radius and line width must be positive".to_string(),
            });
        }
        if !overlay.label_offset.is_finite() {
            return Err(ConfigError::Invalid {
                key: "overlay.label_offset",
                reason: format!("{} is not a finite offset", overlay.label_offset),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_capture_contract() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.endpoint, "ws://localhost:9000/asl");
        assert_eq!(cfg.capture.period(), Duration::from_secs_f64(1.0 / 15.0));
        assert_eq!(cfg.capture.period().as_micros(), 66_666);
        assert_eq!(cfg.reconnect.delay(), Duration::from_millis(3_000));
        assert!(!cfg.reconnect.enabled);
        assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (640, 480, 30));
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.endpoint = "http://localhost:9000/asl".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let mut cfg = AppConfig::default();
        cfg.endpoint = "wss://127.0.0.1:9/asl".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidEndpoint(_))));

        let mut cfg = AppConfig::default();
        cfg.capture.fps = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "capture.fps", .. })
        ));

        let mut cfg = AppConfig::default();
        cfg.capture.jpeg_quality = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_overlay_values() {
        for (radius, width, offset) in [
            (f32::NAN, 2.0, 50.0),
            (4.0, f32::NAN, 50.0),
            (f32::INFINITY, 2.0, 50.0),
            (4.0, 2.0, f32::NAN),
        ] {
            let mut cfg = AppConfig::default();
            cfg.overlay.marker_radius = radius;
            cfg.overlay.line_width = width;
            cfg.overlay.label_offset = offset;
            assert!(cfg.validate().is_err(), "{radius} {width} {offset}");
        }
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("asl-stream-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");
        std::fs::write(
            &path,
            "endpoint = \"ws://10.0.0.2:9000/asl\"\n[reconnect]\nenabled = true\ndelay_ms = 500\n",
        )
        .unwrap();

        let cfg = AppConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(cfg.endpoint, "ws://10.0.0.2:9000/asl");
        assert!(cfg.reconnect.enabled);
        assert_eq!(cfg.reconnect.delay_ms, 500);
        assert_eq!(cfg.capture.fps, 15);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
