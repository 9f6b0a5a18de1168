//! Core data model shared by every component: boxes, detections, tracks, frames,
//! camera/preset state. Kept dependency-free (no opencv, no serde feature gates beyond
//! what's needed for event payloads) so it can be used from tests without pulling in I/O.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Ring-buffer capacity for a track's recent-center trajectory (Design Notes: "Trajectory
/// as bounded sequence").
pub const TRAJECTORY_CAPACITY: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        debug_assert!(x1 <= x2 && y1 <= y2, "box corners out of order");
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Shift the box by a (dx, dy) velocity vector, e.g. for predict-forward motion.
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Intersection-over-union against another box. Zero when disjoint or either area is zero.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let iw = (ix2 - ix1).max(0.0);
        let ih = (iy2 - iy1).max(0.0);
        let intersection = iw * ih;
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Mapping from COCO detector class ids to the vehicle classes this pipeline cares about.
/// Open Question (a): the source's COCO→class map carries a duplicate key `3`, origin
/// unclear. Listed explicitly, once, here: 2=Car, 3=Motorcycle, 5=Bus, 7=Truck, anything
/// else maps to Unknown. A reviewer with access to the original label set should confirm
/// whether `3` was ever meant to double as something other than Motorcycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Unknown,
}

impl VehicleClass {
    pub fn from_coco_id(id: u32) -> Self {
        match id {
            2 => VehicleClass::Car,
            3 => VehicleClass::Motorcycle,
            5 => VehicleClass::Bus,
            7 => VehicleClass::Truck,
            _ => VehicleClass::Unknown,
        }
    }
}

/// A single, transient per-frame detector output. Lives for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class: VehicleClass,
    pub confidence: f32,
}

/// A persistent identity carried across frames. Owned exclusively by the tracker.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u64,
    pub bbox: BoundingBox,
    pub class: VehicleClass,
    pub confidence: f32,
    pub age: u32,
    pub hits: u32,
    pub time_since_update: u32,
    pub velocity: (f32, f32),
    trajectory: VecDeque<(f32, f32)>,
}

impl Track {
    pub(crate) fn spawn(track_id: u64, detection: Detection) -> Self {
        let mut trajectory = VecDeque::with_capacity(TRAJECTORY_CAPACITY);
        trajectory.push_back(detection.bbox.center());
        Self {
            track_id,
            bbox: detection.bbox,
            class: detection.class,
            confidence: detection.confidence,
            age: 0,
            hits: 1,
            time_since_update: 0,
            velocity: (0.0, 0.0),
            trajectory,
        }
    }

    /// Shift by velocity and age forward one frame without a matching detection.
    pub(crate) fn predict(&mut self) {
        self.bbox = self.bbox.shifted(self.velocity.0, self.velocity.1);
        self.age += 1;
        self.time_since_update += 1;
    }

    /// Record a successful association with `detection`.
    pub(crate) fn apply_match(&mut self, detection: Detection) {
        self.bbox = detection.bbox;
        self.confidence = detection.confidence;
        self.class = detection.class;
        self.hits += 1;
        self.time_since_update = 0;
        self.push_center(detection.bbox.center());
        self.recompute_velocity();
    }

    fn push_center(&mut self, center: (f32, f32)) {
        if self.trajectory.len() == TRAJECTORY_CAPACITY {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(center);
    }

    /// Velocity is derived from only the two most recent centers; older history never
    /// contributes, per the tracker invariant.
    fn recompute_velocity(&mut self) {
        let len = self.trajectory.len();
        if len < 2 {
            return;
        }
        let prev = self.trajectory[len - 2];
        let curr = self.trajectory[len - 1];
        self.velocity = (curr.0 - prev.0, curr.1 - prev.1);
    }

    pub fn trajectory(&self) -> Vec<(f32, f32)> {
        self.trajectory.iter().copied().collect()
    }

    pub fn is_confirmed(&self, min_hits: u32) -> bool {
        self.hits >= min_hits
    }
}

/// One decoded frame with its monotonically increasing (within a connection) number.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_number: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Device-reported (pan, tilt, zoom) plus the controller's local software state, snapshot
/// for publication or for tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
    pub last_target: Option<(f32, f32)>,
    pub is_moving: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_center_round_trip_is_identity() {
        let original = BoundingBox::new(100.0, 100.0, 300.0, 260.0);
        let (cx, cy) = original.center();
        let w = original.width();
        let h = original.height();
        let rebuilt = BoundingBox::from_center(cx, cy, w, h);
        assert!((rebuilt.x1 - original.x1).abs() < 1e-3);
        assert!((rebuilt.y1 - original.y1).abs() < 1e-3);
        assert!((rebuilt.x2 - original.x2).abs() < 1e-3);
        assert!((rebuilt.y2 - original.y2).abs() < 1e-3);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vehicle_class_maps_known_coco_ids() {
        assert_eq!(VehicleClass::from_coco_id(2), VehicleClass::Car);
        assert_eq!(VehicleClass::from_coco_id(3), VehicleClass::Motorcycle);
        assert_eq!(VehicleClass::from_coco_id(5), VehicleClass::Bus);
        assert_eq!(VehicleClass::from_coco_id(7), VehicleClass::Truck);
        assert_eq!(VehicleClass::from_coco_id(99), VehicleClass::Unknown);
    }

    #[test]
    fn track_trajectory_is_capped_at_capacity() {
        let det = Detection {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            class: VehicleClass::Car,
            confidence: 0.9,
        };
        let mut track = Track::spawn(1, det);
        for i in 0..(TRAJECTORY_CAPACITY + 10) {
            let moved = Detection {
                bbox: BoundingBox::new(i as f32, 0.0, i as f32 + 10.0, 10.0),
                class: VehicleClass::Car,
                confidence: 0.9,
            };
            track.apply_match(moved);
        }
        assert_eq!(track.trajectory().len(), TRAJECTORY_CAPACITY);
    }
}
