//! JSON payload shapes published to the event bus. Enums serialize as lowercase strings;
//! timestamps are ISO-8601 UTC, matching the wire contract every subscriber (OCR,
//! storage, dashboard) is built against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, VehicleClass};

pub struct EventTopics;
impl EventTopics {
    pub const DETECTIONS: &'static str = "detections";
    pub const TRACKING: &'static str = "tracking";
    pub const PTZ_COMMANDS: &'static str = "ptz.commands";
    pub const PTZ_STATUS: &'static str = "ptz.status";
    pub const ANPR_REQUESTS: &'static str = "anpr.requests";
    pub const ANPR_RESULTS: &'static str = "anpr.results";
    pub const SYSTEM: &'static str = "system";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub bbox: BoundingBox,
    pub class: VehicleClass,
    pub confidence: f32,
    pub frame_w: u32,
    pub frame_h: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub track_id: u64,
    pub frame_number: u64,
    pub bbox: BoundingBox,
    pub class: VehicleClass,
    pub confidence: f32,
    pub velocity: (f32, f32),
    pub trajectory: Vec<(f32, f32)>,
    pub age: u32,
    pub hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzCommandKind {
    MoveAbsolute,
    MoveRelative,
    Zoom,
    GotoPreset,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtzCommandEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub command: PtzCommandKind,
    pub pan: Option<f32>,
    pub tilt: Option<f32>,
    pub zoom: Option<f32>,
    pub preset_id: Option<String>,
    pub target_track_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtzStatusEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
    pub is_moving: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnprRequest {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub track_id: u64,
    pub frame_number: u64,
    pub crop_path: String,
    pub plate_bbox: BoundingBox,
    pub vehicle_bbox: BoundingBox,
    pub class: VehicleClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnprResult {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub track_id: u64,
    pub plate_text: String,
    pub confidence: f32,
    pub crop_path: String,
    pub validated: bool,
    pub raw_detections: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub service_name: String,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_event_json_round_trips() {
        let event = TrackingEvent {
            event_id: "evt-1".into(),
            timestamp: Utc::now(),
            track_id: 42,
            frame_number: 7,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            class: VehicleClass::Car,
            confidence: 0.87,
            velocity: (1.5, -2.0),
            trajectory: vec![(0.0, 0.0), (1.0, 1.0)],
            age: 12,
            hits: 5,
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: TrackingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.track_id, event.track_id);
        assert_eq!(decoded.velocity, event.velocity);
        assert_eq!(decoded.trajectory, event.trajectory);
        assert_eq!(decoded.class, VehicleClass::Car);
    }

    #[test]
    fn command_kind_serializes_lowercase() {
        let json = serde_json::to_string(&PtzCommandKind::GotoPreset).unwrap();
        assert_eq!(json, "\"goto_preset\"");
    }

    #[test]
    fn vehicle_class_serializes_lowercase() {
        let json = serde_json::to_string(&VehicleClass::Motorcycle).unwrap();
        assert_eq!(json, "\"motorcycle\"");
    }
}
