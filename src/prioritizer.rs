//! Chooses at most one current target per frame from the tracker's confirmed set.
//!
//! Polymorphism note (Design Notes): strategies are a tagged variant, dispatched by a
//! `match` inside `select`, rather than a trait object — there are exactly three
//! strategies and none of them carry behavior beyond the weights already on the variant.

use std::collections::HashSet;

use crate::types::Track;

#[derive(Debug, Clone)]
pub enum Strategy {
    Proximity,
    Roi { zones: Vec<RoiZone> },
    Weighted { weights: Weights, roi_zones: Vec<RoiZone> },
}

#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub proximity: f32,
    pub roi: f32,
    pub speed: f32,
    pub novelty: f32,
}

#[derive(Debug, Clone)]
pub struct RoiZone {
    pub name: String,
    pub weight: f32,
    pub polygon: Vec<(f32, f32)>,
}

impl RoiZone {
    /// Ray-casting point-in-polygon test. No geometry crate dependency is warranted for
    /// this single predicate.
    fn contains(&self, point: (f32, f32)) -> bool {
        let (px, py) = point;
        let mut inside = false;
        let n = self.polygon.len();
        if n < 3 {
            return false;
        }
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.polygon[i];
            let (xj, yj) = self.polygon[j];
            let intersects = ((yi > py) != (yj > py))
                && (px < (xj - xi) * (py - yi) / (yj - yi) + xi);
            if intersects {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

pub struct Prioritizer {
    strategy: Strategy,
    min_target_size_pixels: f32,
    tracked_ids: HashSet<u64>,
}

impl Prioritizer {
    pub fn new(strategy: Strategy, min_target_size_pixels: f32) -> Self {
        Self { strategy, min_target_size_pixels, tracked_ids: HashSet::new() }
    }

    pub fn mark_tracked(&mut self, track_id: u64) {
        self.tracked_ids.insert(track_id);
    }

    /// Deterministic: `tracks` should already be in ascending track-id order (the
    /// tracker's own output contract), so all tie-breaks below fall out of iteration
    /// order for free.
    pub fn select(&self, tracks: &[Track], frame_w: f32, frame_h: f32) -> Option<Track> {
        let candidates: Vec<&Track> = tracks
            .iter()
            .filter(|t| t.bbox.height() >= self.min_target_size_pixels)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        match &self.strategy {
            Strategy::Proximity => self.select_proximity(&candidates, frame_w, frame_h),
            Strategy::Roi { zones } => self.select_roi(&candidates, zones),
            Strategy::Weighted { weights, roi_zones } => {
                self.select_weighted(&candidates, frame_w, frame_h, weights, roi_zones)
            }
        }
        .cloned()
    }

    fn select_proximity<'a>(
        &self,
        candidates: &[&'a Track],
        frame_w: f32,
        frame_h: f32,
    ) -> Option<&'a Track> {
        let (cx, cy) = (frame_w / 2.0, frame_h / 2.0);
        candidates
            .iter()
            .copied()
            .min_by(|a, b| distance(a, cx, cy).partial_cmp(&distance(b, cx, cy)).unwrap())
    }

    fn select_roi<'a>(&self, candidates: &[&'a Track], zones: &[RoiZone]) -> Option<&'a Track> {
        let mut best: Option<(&'a Track, f32)> = None;
        for track in candidates {
            if let Some(w) = zone_weight_at(zones, track.bbox.center()) {
                if best.as_ref().map_or(true, |(_, bw)| w > *bw) {
                    best = Some((track, w));
                }
            }
        }
        best.map(|(t, _)| t).or_else(|| candidates.first().copied())
    }

    fn select_weighted<'a>(
        &self,
        candidates: &[&'a Track],
        frame_w: f32,
        frame_h: f32,
        weights: &Weights,
        roi_zones: &[RoiZone],
    ) -> Option<&'a Track> {
        let (cx, cy) = (frame_w / 2.0, frame_h / 2.0);
        let d_max = ((frame_w / 2.0).powi(2) + (frame_h / 2.0).powi(2)).sqrt();

        let mut best: Option<(&'a Track, f32)> = None;
        for track in candidates {
            let d = distance(track, cx, cy);
            let proximity_score = 1.0 - d / d_max;
            let roi_score = zone_weight_at(roi_zones, track.bbox.center()).unwrap_or(0.0);
            let speed = (track.velocity.0.powi(2) + track.velocity.1.powi(2)).sqrt();
            let speed_score = (speed / 20.0).min(1.0);
            let novelty_score = if self.tracked_ids.contains(&track.track_id) { 0.0 } else { 1.0 };

            let score = weights.proximity * proximity_score
                + weights.roi * roi_score
                + weights.speed * speed_score
                + weights.novelty * novelty_score;

            if best.as_ref().map_or(true, |(_, bs)| score > *bs) {
                best = Some((track, score));
            }
        }
        best.map(|(t, _)| t)
    }
}

fn distance(track: &Track, cx: f32, cy: f32) -> f32 {
    let (tx, ty) = track.bbox.center();
    ((tx - cx).powi(2) + (ty - cy).powi(2)).sqrt()
}

/// The highest weight among configured zones containing `point`, or `None` if it falls
/// inside no zone at all.
fn zone_weight_at(zones: &[RoiZone], point: (f32, f32)) -> Option<f32> {
    zones
        .iter()
        .filter(|zone| zone.contains(point))
        .map(|zone| zone.weight)
        .fold(None, |best, w| Some(best.map_or(w, |b: f32| b.max(w))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, VehicleClass};

    fn track(id: u64, cx: f32, cy: f32) -> Track {
        Track::spawn(
            id,
            crate::types::Detection {
                bbox: BoundingBox::from_center(cx, cy, 40.0, 40.0),
                class: VehicleClass::Car,
                confidence: 0.9,
            },
        )
    }

    #[test]
    fn proximity_picks_closest_to_frame_center() {
        let p = Prioritizer::new(Strategy::Proximity, 0.0);
        let tracks = vec![track(1, 50.0, 50.0), track(2, 640.0, 360.0)];
        let selected = p.select(&tracks, 1280.0, 720.0).unwrap();
        assert_eq!(selected.track_id, 2);
    }

    #[test]
    fn roi_falls_back_to_first_candidate_when_no_zone_matches() {
        let p = Prioritizer::new(Strategy::Roi { zones: vec![] }, 0.0);
        let tracks = vec![track(1, 10.0, 10.0), track(2, 20.0, 20.0)];
        let selected = p.select(&tracks, 100.0, 100.0).unwrap();
        assert_eq!(selected.track_id, 1);
    }

    #[test]
    fn roi_prefers_highest_weighted_matching_zone() {
        let low = RoiZone {
            name: "low".into(),
            weight: 0.2,
            polygon: vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)],
        };
        let high = RoiZone {
            name: "high".into(),
            weight: 0.9,
            polygon: vec![(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0)],
        };
        let p = Prioritizer::new(Strategy::Roi { zones: vec![low, high] }, 0.0);
        let tracks = vec![track(1, 10.0, 10.0)];
        let selected = p.select(&tracks, 200.0, 200.0).unwrap();
        assert_eq!(selected.track_id, 1);
    }

    #[test]
    fn weighted_strategy_penalizes_already_tracked_ids() {
        let weights = Weights { proximity: 0.0, roi: 0.0, speed: 0.0, novelty: 1.0 };
        let mut p = Prioritizer::new(Strategy::Weighted { weights, roi_zones: vec![] }, 0.0);
        let tracks = vec![track(1, 50.0, 50.0), track(2, 60.0, 60.0)];
        p.mark_tracked(1);
        let selected = p.select(&tracks, 100.0, 100.0).unwrap();
        assert_eq!(selected.track_id, 2, "id 1 already tracked, novelty score should favor id 2");
    }

    #[test]
    fn weighted_strategy_uses_roi_term_from_configured_zones() {
        let weights = Weights { proximity: 0.0, roi: 1.0, speed: 0.0, novelty: 0.0 };
        let zone = RoiZone {
            name: "entrance".into(),
            weight: 0.8,
            polygon: vec![(0.0, 0.0), (80.0, 0.0), (80.0, 80.0), (0.0, 80.0)],
        };
        let p = Prioritizer::new(Strategy::Weighted { weights, roi_zones: vec![zone] }, 0.0);
        let tracks = vec![track(1, 50.0, 50.0), track(2, 500.0, 500.0)];
        let selected = p.select(&tracks, 1000.0, 1000.0).unwrap();
        assert_eq!(selected.track_id, 1, "id 1 sits inside the weighted zone, id 2 doesn't");
    }

    #[test]
    fn min_target_size_filters_small_tracks() {
        let p = Prioritizer::new(Strategy::Proximity, 100.0);
        let mut small = track(1, 50.0, 50.0);
        small.bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(p.select(&[small], 100.0, 100.0).is_none());
    }
}
