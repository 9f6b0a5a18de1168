//! Per-frame identity management: associates detections with existing tracks by greedy
//! IoU matching, ages and retires stale tracks, spawns new ones from leftovers.
//!
//! The association loop is intentionally a per-track ascending-id scan, not a global
//! sort of all (track, detection) pairs by IoU — see the matching-order note in the
//! tracker's own design document. That ordering is what makes two-vehicle association
//! reproducible call over call.

use std::collections::BTreeMap;

use crate::types::{Detection, Track};

pub struct TrackerConfig {
    pub iou_threshold: f32,
    pub max_age: u32,
    pub min_hits: u32,
}

pub struct Tracker {
    config: TrackerConfig,
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, tracks: BTreeMap::new(), next_id: 1 }
    }

    /// One pure step: predict, associate, spawn, retire, return confirmed tracks in
    /// ascending id order. Called at most once per frame.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        for track in self.tracks.values_mut() {
            track.predict();
        }

        let mut claimed_detections = vec![false; detections.len()];

        // Ascending track id order: BTreeMap already iterates that way.
        for (_, track) in self.tracks.iter_mut() {
            let mut best_idx: Option<usize> = None;
            let mut best_iou = self.config.iou_threshold;

            for (di, det) in detections.iter().enumerate() {
                if claimed_detections[di] {
                    continue;
                }
                let iou = track.bbox.iou(&det.bbox);
                if iou > best_iou {
                    best_iou = iou;
                    best_idx = Some(di);
                }
            }

            if let Some(di) = best_idx {
                claimed_detections[di] = true;
                track.apply_match(detections[di]);
            }
        }

        for (di, detection) in detections.iter().enumerate() {
            if !claimed_detections[di] {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.insert(id, Track::spawn(id, *detection));
            }
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|_, track| track.time_since_update <= max_age);

        let min_hits = self.config.min_hits;
        self.tracks
            .values()
            .filter(|t| t.is_confirmed(min_hits))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, VehicleClass};

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            class: VehicleClass::Car,
            confidence: 0.9,
        }
    }

    fn tracker(min_hits: u32, iou_threshold: f32) -> Tracker {
        Tracker::new(TrackerConfig { iou_threshold, max_age: 30, min_hits })
    }

    /// Scenario 1: single moving car across three frames.
    #[test]
    fn single_moving_car_confirms_by_frame_two_and_tracks_velocity() {
        let mut t = tracker(2, 0.3);

        let confirmed = t.update(&[det(100.0, 100.0, 300.0, 300.0)]);
        assert!(confirmed.is_empty(), "hits=1 is not yet confirmed");

        let confirmed = t.update(&[det(110.0, 100.0, 310.0, 300.0)]);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].track_id, 1);

        let confirmed = t.update(&[det(120.0, 100.0, 320.0, 300.0)]);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].velocity, (10.0, 0.0));
        assert_eq!(confirmed[0].trajectory().len(), 3);
    }

    /// Scenario 2: two vehicles, greedy per-track association — each track keeps its own
    /// detection, no spurious new track is spawned.
    #[test]
    fn two_vehicles_greedy_association_keeps_identity() {
        let mut t = tracker(1, 0.3);
        let first = t.update(&[det(0.0, 0.0, 50.0, 50.0), det(100.0, 0.0, 150.0, 50.0)]);
        assert_eq!(first.len(), 2);
        let t1_id = first[0].track_id;
        let t2_id = first[1].track_id;

        let second = t.update(&[det(5.0, 0.0, 55.0, 50.0), det(105.0, 0.0, 155.0, 50.0)]);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].track_id, t1_id);
        assert_eq!(second[1].track_id, t2_id);
    }

    #[test]
    fn unconfirmed_track_is_not_returned() {
        let mut t = tracker(3, 0.3);
        let confirmed = t.update(&[det(0.0, 0.0, 10.0, 10.0)]);
        assert!(confirmed.is_empty());
    }

    #[test]
    fn track_ids_are_never_reused_after_retirement() {
        let mut t = tracker(1, 0.3);
        let first = t.update(&[det(0.0, 0.0, 10.0, 10.0)]);
        let retired_id = first[0].track_id;

        // Age the track past max_age with empty frames so it gets retired.
        for _ in 0..31 {
            t.update(&[]);
        }

        let spawned = t.update(&[det(0.0, 0.0, 10.0, 10.0)]);
        assert_ne!(spawned[0].track_id, retired_id);
    }

    #[test]
    fn each_detection_associates_to_at_most_one_track() {
        let mut t = tracker(1, 0.1);
        // Two overlapping tracks competing for the same detection: only one may claim it.
        t.update(&[det(0.0, 0.0, 100.0, 100.0), det(10.0, 0.0, 110.0, 100.0)]);
        let confirmed = t.update(&[det(5.0, 0.0, 105.0, 100.0)]);
        // Exactly one of the two pre-existing tracks matched; the other aged without a hit,
        // and no detection was claimed twice (tracker would otherwise report an extra hit).
        let matched_this_frame = confirmed.iter().filter(|tr| tr.time_since_update == 0).count();
        assert_eq!(matched_this_frame, 1);
    }
}
