use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::zone::ZoneRect;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_capture_width() -> u32 {
    1280
}

fn default_capture_height() -> u32 {
    720
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    #[serde(default = "default_capture_width")]
    pub width: u32,
    #[serde(default = "default_capture_height")]
    pub height: u32,
    /// Live sources are reconnected on read failure, files end the run.
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl SourceConfig {
    pub fn is_live(&self) -> bool {
        self.live.unwrap_or_else(|| {
            ["rtsp://", "rtsps://", "rtmp://", "http://", "https://", "udp://"]
                .iter()
                .any(|scheme| self.url.starts_with(scheme))
        })
    }
}

fn default_change_threshold() -> u8 {
    55
}

fn default_min_area() -> f64 {
    2000.0
}

fn default_max_area() -> f64 {
    5000.0
}

fn default_speed_threshold() -> f64 {
    4300.0
}

fn default_static_threshold() -> i32 {
    300
}

fn default_lower_hsv() -> [u8; 3] {
    [102, 50, 50]
}

fn default_upper_hsv() -> [u8; 3] {
    [122, 131, 145]
}

fn default_downscale() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_change_threshold")]
    pub change_threshold: u8,
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    #[serde(default = "default_max_area")]
    pub max_area: f64,
    /// Pixels per second at working resolution.
    #[serde(default = "default_speed_threshold")]
    pub speed_threshold: f64,
    #[serde(default = "default_static_threshold")]
    pub static_threshold: i32,
    /// OpenCV-style 8-bit HSV: hue 0..180, saturation and value 0..255.
    #[serde(default = "default_lower_hsv")]
    pub lower_hsv: [u8; 3],
    #[serde(default = "default_upper_hsv")]
    pub upper_hsv: [u8; 3],
    #[serde(default = "default_downscale")]
    pub downscale: u32,
    #[serde(default)]
    pub working_width: Option<u32>,
    #[serde(default)]
    pub working_height: Option<u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            change_threshold: default_change_threshold(),
            min_area: default_min_area(),
            max_area: default_max_area(),
            speed_threshold: default_speed_threshold(),
            static_threshold: default_static_threshold(),
            lower_hsv: default_lower_hsv(),
            upper_hsv: default_upper_hsv(),
            downscale: default_downscale(),
            working_width: None,
            working_height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_zone_origin")]
    pub x: i32,
    #[serde(default = "default_zone_origin")]
    pub y: i32,
    #[serde(default = "default_zone_width")]
    pub width: i32,
    #[serde(default = "default_zone_height")]
    pub height: i32,
}

fn default_zone_origin() -> i32 {
    100
}

fn default_zone_width() -> i32 {
    420
}

fn default_zone_height() -> i32 {
    310
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            x: default_zone_origin(),
            y: default_zone_origin(),
            width: default_zone_width(),
            height: default_zone_height(),
        }
    }
}

impl From<ZoneConfig> for ZoneRect {
    fn from(zone: ZoneConfig) -> Self {
        ZoneRect::new(zone.x, zone.y, zone.width, zone.height)
    }
}

fn default_alert_history() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Program and arguments spawned on every alert, e.g. `["aplay", "alert.wav"]`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_alert_history")]
    pub history: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            command: None,
            history: default_alert_history(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_display_interval_ms() -> u64 {
    100
}

fn default_jpeg_quality() -> u8 {
    80
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_display_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: default_display_interval_ms(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::args()
            .nth(1)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.source.url.trim().is_empty() {
            return invalid("source.url is empty");
        }
        if self.source.width == 0 || self.source.height == 0 {
            return invalid("source dimensions must be non-zero");
        }

        let det = &self.detection;
        if det.downscale == 0 {
            return invalid("detection.downscale must be at least 1");
        }
        match (det.working_width, det.working_height) {
            (Some(0), _) | (_, Some(0)) => {
                return invalid("working resolution must be non-zero");
            }
            (Some(_), None) | (None, Some(_)) => {
                return invalid("working_width and working_height must be set together");
            }
            _ => {}
        }
        if det.min_area < 0.0 || det.min_area > det.max_area {
            return invalid("detection.min_area must be within 0..=max_area");
        }
        if det.speed_threshold < 0.0 || det.static_threshold < 0 {
            return invalid("detection thresholds must be non-negative");
        }
        if det.lower_hsv.iter().zip(&det.upper_hsv).any(|(lo, hi)| lo > hi) {
            return invalid("detection.lower_hsv exceeds upper_hsv");
        }

        let zone = &self.zone;
        if zone.width < 0 || zone.height < 0 {
            return invalid("zone dimensions must be non-negative");
        }
        if zone.x.checked_add(zone.width).is_none() || zone.y.checked_add(zone.height).is_none() {
            return invalid("zone extends past the coordinate range");
        }

        Ok(())
    }
}
