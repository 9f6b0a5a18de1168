//! Layered configuration: a YAML file (`argus.yaml`, optional) overlaid with
//! `ARGUS__SECTION__KEY` environment variables, loaded once at startup into a single typed
//! tree. Design Notes: no component reads configuration after construction — each accepts
//! its own section by value from the struct below, never a global.

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub rtsp: RtspConfig,
    pub ptz: PtzConfig,
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
    pub anpr: AnprConfig,
    pub prioritization: PrioritizationConfig,
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RtspConfig {
    pub primary_url: String,
    pub backup_url: Option<String>,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_frame_buffer_size")]
    pub frame_buffer_size: usize,
}
fn default_reconnect_delay() -> u64 { 5 }
fn default_max_reconnect_attempts() -> u32 { 10 }
fn default_frame_buffer_size() -> usize { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct PtzConfig {
    pub onvif: OnvifConfig,
    pub control: PtzControlConfig,
    pub idle_behavior: IdleBehaviorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OnvifConfig {
    pub host: String,
    #[serde(default = "default_onvif_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub use_digest_auth: bool,
    #[serde(default = "default_onvif_timeout")]
    pub timeout_seconds: u64,
}
fn default_onvif_port() -> u16 { 80 }
fn default_onvif_timeout() -> u64 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct PtzControlConfig {
    #[serde(default = "default_hysteresis_pixels")]
    pub hysteresis_pixels: f32,
    #[serde(default = "default_speed")]
    pub pan_speed: f32,
    #[serde(default = "default_speed")]
    pub tilt_speed: f32,
    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,
    #[serde(default = "default_move_rate_limit_ms")]
    pub move_rate_limit_ms: u64,
}
fn default_hysteresis_pixels() -> f32 { 50.0 }
fn default_speed() -> f32 { 0.5 }
fn default_zoom_step() -> f32 { 0.1 }
fn default_move_rate_limit_ms() -> u64 { 2000 }

#[derive(Debug, Deserialize, Clone)]
pub struct IdleBehaviorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_idle_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_return_to_preset")]
    pub return_to_preset: String,
    #[serde(default)]
    pub sweep_enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}
fn default_true() -> bool { true }
fn default_idle_timeout() -> u64 { 60 }
fn default_return_to_preset() -> String { "1".into() }
fn default_sweep_interval() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold_detection")]
    pub iou_threshold: f32,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub half_precision: bool,
}
fn default_confidence_threshold() -> f32 { 0.5 }
fn default_iou_threshold_detection() -> f32 { 0.45 }
fn default_device() -> String { "cpu".into() }
fn default_input_size() -> u32 { 640 }

#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    #[serde(default = "default_max_age")]
    pub max_age: u32,
    #[serde(default = "default_min_hits")]
    pub min_hits: u32,
    #[serde(default = "default_iou_threshold_tracking")]
    pub iou_threshold: f32,
}
fn default_max_age() -> u32 { 30 }
fn default_min_hits() -> u32 { 3 }
fn default_iou_threshold_tracking() -> f32 { 0.3 }

#[derive(Debug, Deserialize, Clone)]
pub struct AnprConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_min_plate_height")]
    pub min_plate_height_pixels: f32,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub plate_patterns: Vec<String>,
}
fn default_min_confidence() -> f32 { 0.6 }
fn default_min_plate_height() -> f32 { 30.0 }

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_target_plate_height")]
    pub zoom_target_plate_height: f32,
    #[serde(default = "default_stability_frames")]
    pub stability_frames: u32,
}
fn default_target_plate_height() -> f32 { 60.0 }
fn default_stability_frames() -> u32 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct PrioritizationConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub weights: PrioritizationWeights,
    #[serde(default)]
    pub roi_zones: Vec<RoiZoneConfig>,
    #[serde(default = "default_min_target_size")]
    pub min_target_size_pixels: f32,
}
fn default_strategy() -> String { "weighted".into() }
fn default_min_target_size() -> f32 { 0.0 }

#[derive(Debug, Deserialize, Clone)]
pub struct PrioritizationWeights {
    #[serde(default = "default_w_proximity")]
    pub proximity: f32,
    #[serde(default = "default_w_roi")]
    pub roi: f32,
    #[serde(default = "default_w_speed")]
    pub speed: f32,
    #[serde(default = "default_w_novelty")]
    pub novelty: f32,
}
fn default_w_proximity() -> f32 { 0.4 }
fn default_w_roi() -> f32 { 0.3 }
fn default_w_speed() -> f32 { 0.2 }
fn default_w_novelty() -> f32 { 0.1 }
impl Default for PrioritizationWeights {
    fn default() -> Self {
        Self {
            proximity: default_w_proximity(),
            roi: default_w_roi(),
            speed: default_w_speed(),
            novelty: default_w_novelty(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoiZoneConfig {
    pub name: String,
    pub weight: f32,
    /// Polygon vertices as (x, y) pixel pairs, in order.
    pub polygon: Vec<(f32, f32)>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    pub redis: RedisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    pub password: Option<String>,
    #[serde(default = "default_stream_max_len")]
    pub stream_max_len: usize,
}
fn default_redis_port() -> u16 { 6379 }
fn default_stream_max_len() -> usize { 10_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}
fn default_log_level() -> String { "info".into() }
fn default_log_format() -> String { "compact".into() }
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Reads `argus.yaml` (if present) layered with `ARGUS__SECTION__KEY` environment
/// overrides. Called exactly once, at startup; the result is handed to components by
/// value from there on.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name("argus").required(false))
        .add_source(config::Environment::with_prefix("ARGUS").separator("__"))
        .build()?;
    let app: AppConfig = raw.try_deserialize()?;
    if app.rtsp.primary_url.is_empty() {
        return Err(ConfigError::Missing("rtsp.primary_url".into()));
    }
    Ok(app)
}
