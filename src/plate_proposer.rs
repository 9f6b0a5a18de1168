//! Estimates a plate sub-region inside a vehicle box and gates when a capture is
//! admissible: big enough, and the same target held long enough to be worth a capture.

use std::collections::HashMap;

use crate::types::BoundingBox;

pub struct PlateProposerConfig {
    pub min_plate_height_pixels: f32,
    pub target_plate_height: f32,
    pub stability_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readiness {
    pub ready: bool,
    pub zoom_factor: f32,
}

pub struct PlateProposer {
    config: PlateProposerConfig,
    stable_tracks: HashMap<u64, u32>,
}

impl PlateProposer {
    pub fn new(config: PlateProposerConfig) -> Self {
        Self { config, stable_tracks: HashMap::new() }
    }

    /// Plate height = 15% of vehicle height, width = 60% of vehicle width, horizontally
    /// centered, vertically positioned so its top sits a quarter of the vehicle's height
    /// above the vehicle's bottom edge. Suited to front-facing plates; callers may
    /// substitute a different heuristic as long as the interface is preserved.
    pub fn estimate_plate_region(&self, vehicle: &BoundingBox) -> BoundingBox {
        let plate_height = vehicle.height() * 0.15;
        let plate_width = vehicle.width() * 0.6;
        let plate_x1 = vehicle.x1 + (vehicle.width() - plate_width) / 2.0;
        let plate_y1 = vehicle.y2 - vehicle.height() * 0.25;
        BoundingBox::new(plate_x1, plate_y1, plate_x1 + plate_width, plate_y1 + plate_height)
    }

    /// Rules are evaluated strictly in order: size gate, then stability gate, then the
    /// target-height threshold. `track_id` is the *currently selected* target; any other
    /// value zeroes the stability counter, same as an explicit `reset_stability` call.
    pub fn is_ready_for_capture(&mut self, track_id: u64, plate: &BoundingBox) -> Readiness {
        let plate_height = plate.height();

        if plate_height < self.config.min_plate_height_pixels {
            return Readiness {
                ready: false,
                zoom_factor: self.config.target_plate_height / plate_height,
            };
        }

        let counter = self.stable_tracks.entry(track_id).or_insert(0);
        *counter += 1;
        if *counter < self.config.stability_frames {
            return Readiness { ready: false, zoom_factor: 1.0 };
        }

        if plate_height >= self.config.target_plate_height {
            return Readiness { ready: true, zoom_factor: 1.0 };
        }

        Readiness {
            ready: false,
            zoom_factor: self.config.target_plate_height / plate_height,
        }
    }

    pub fn reset_stability(&mut self, track_id: u64) {
        self.stable_tracks.remove(&track_id);
    }

    pub fn cleanup(&mut self, active_ids: &[u64]) {
        let active: std::collections::HashSet<u64> = active_ids.iter().copied().collect();
        self.stable_tracks.retain(|id, _| active.contains(id));
    }
}

/// Convenience used by the orchestrator: on a target switch, reset stability for the
/// newly selected id, matching the proposer's "any other target zeroes the counter"
/// rule without forcing callers to track bookkeeping themselves. The previous target's
/// counter is left alone — it's the new target that starts from zero.
pub fn handle_target_change(proposer: &mut PlateProposer, previous: Option<u64>, current: Option<u64>) {
    if previous != current {
        if let Some(curr_id) = current {
            proposer.reset_stability(curr_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposer(min_h: f32, target_h: f32, stability: u32) -> PlateProposer {
        PlateProposer::new(PlateProposerConfig {
            min_plate_height_pixels: min_h,
            target_plate_height: target_h,
            stability_frames: stability,
        })
    }

    #[test]
    fn region_heuristic_matches_documented_formula() {
        let p = proposer(0.0, 100.0, 1);
        let vehicle = BoundingBox::new(100.0, 100.0, 300.0, 500.0); // w=200, h=400
        let plate = p.estimate_plate_region(&vehicle);
        assert!((plate.height() - 60.0).abs() < 1e-3); // 15% of 400
        assert!((plate.width() - 120.0).abs() < 1e-3); // 60% of 200
        assert!((plate.y1 - (500.0 - 100.0)).abs() < 1e-3); // y2 - 0.25*h
    }

    /// Scenario 5: capture readiness with stability gating.
    #[test]
    fn stability_gate_then_ready_at_target_height() {
        let mut p = proposer(30.0, 60.0, 3);
        // plate height computed from a vehicle of height 400 -> 0.15 * 400 = 60
        let vehicle = BoundingBox::new(0.0, 0.0, 200.0, 400.0);
        let plate = p.estimate_plate_region(&vehicle);

        let r1 = p.is_ready_for_capture(1, &plate);
        assert!(!r1.ready);
        let r2 = p.is_ready_for_capture(1, &plate);
        assert!(!r2.ready);
        let r3 = p.is_ready_for_capture(1, &plate);
        assert!(r3.ready);
        assert!((r3.zoom_factor - 1.0).abs() < 1e-6);
    }

    #[test]
    fn switching_target_resets_stability_counter() {
        let mut p = proposer(10.0, 60.0, 2);
        let plate = BoundingBox::new(0.0, 0.0, 100.0, 60.0);
        p.is_ready_for_capture(1, &plate);
        p.reset_stability(1);
        let r = p.is_ready_for_capture(1, &plate);
        assert!(!r.ready, "counter should have restarted from zero after reset");
    }

    #[test]
    fn undersized_plate_reports_not_ready_with_zoom_in_factor() {
        let mut p = proposer(30.0, 60.0, 1);
        let plate = BoundingBox::new(0.0, 0.0, 100.0, 15.0);
        let r = p.is_ready_for_capture(1, &plate);
        assert!(!r.ready);
        assert!((r.zoom_factor - (60.0 / 15.0)).abs() < 1e-3);
    }

    #[test]
    fn target_change_resets_the_new_targets_stability_not_the_old_ones() {
        let mut p = proposer(10.0, 60.0, 3);
        let plate = BoundingBox::new(0.0, 0.0, 100.0, 20.0);
        // id 1 builds up some stability, id 2 has none yet.
        p.is_ready_for_capture(1, &plate);
        p.is_ready_for_capture(1, &plate);
        assert_eq!(p.stable_tracks.get(&1), Some(&2));

        // Switching the current target from 1 to 2 must reset 2's counter (it's new),
        // not 1's — 1 didn't lose any accumulated stability just because it's no longer
        // selected.
        handle_target_change(&mut p, Some(1), Some(2));
        assert_eq!(p.stable_tracks.get(&1), Some(&2), "previous target's count must survive");
        assert!(p.stable_tracks.get(&2).is_none(), "new target should start from zero");
    }

    #[test]
    fn cleanup_drops_stale_track_entries() {
        let mut p = proposer(10.0, 60.0, 5);
        let plate = BoundingBox::new(0.0, 0.0, 100.0, 20.0);
        p.is_ready_for_capture(7, &plate);
        assert!(p.stable_tracks.contains_key(&7));
        p.cleanup(&[]);
        assert!(!p.stable_tracks.contains_key(&7));
    }
}
