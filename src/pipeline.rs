//! Orchestrates one frame end to end: detect, track, prioritize a single target, then
//! either capture its plate or steer the camera toward it. Three threads share one
//! `PtzController` — the main loop (detect/track/command), a status publisher, and an
//! idle monitor — synchronized only through the controller's own lock (Design Notes).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;

use crate::detector::ObjectDetector;
use crate::events::schemas::{
    AnprRequest, DetectionEvent, PtzCommandEvent, PtzCommandKind, PtzStatusEvent, TrackingEvent,
};
use crate::events::bus::BusEvent;
use crate::plate_proposer::{handle_target_change, PlateProposer};
use crate::prioritizer::Prioritizer;
use crate::ptz::controller::PtzController;
use crate::storage;
use crate::stream::StreamIngest;
use crate::tracker::Tracker;
use crate::types::Frame;

pub struct PipelineConfig {
    pub frame_read_timeout: Duration,
    pub status_publish_interval: Duration,
    pub idle_monitor_interval: Duration,
    pub crop_base_dir: PathBuf,
    /// Mirrors `anpr.capture.zoom_target_plate_height`; the orchestrator needs it
    /// directly to compose zoom commands, not just the proposer's readiness verdict.
    pub target_plate_height: f32,
}

/// What happened on one call to `process_frame`. Exists so tests (and anyone tailing the
/// pipeline) can assert on behavior without subscribing to the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub target_track_id: Option<u64>,
    pub captured: bool,
    pub ptz_command_sent: bool,
}

pub struct Pipeline {
    stream: StreamIngest,
    detector: Box<dyn ObjectDetector>,
    tracker: Tracker,
    prioritizer: Prioritizer,
    proposer: PlateProposer,
    controller: Arc<PtzController>,
    event_tx: flume::Sender<BusEvent>,
    config: PipelineConfig,
    current_target: Option<u64>,
    event_seq: Arc<AtomicU64>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: StreamIngest,
        detector: Box<dyn ObjectDetector>,
        tracker: Tracker,
        prioritizer: Prioritizer,
        proposer: PlateProposer,
        controller: Arc<PtzController>,
        event_tx: flume::Sender<BusEvent>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            stream,
            detector,
            tracker,
            prioritizer,
            proposer,
            controller,
            event_tx,
            config,
            current_target: None,
            event_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs until `stop_flag` is set. Intended to be the body of a `spawn_blocking`
    /// task: the capture thread inside `stream` and the two background threads started
    /// here are the only concurrency the pipeline itself introduces.
    pub fn run(&mut self, stop_flag: Arc<AtomicBool>) {
        let status_handle = self.spawn_status_publisher(stop_flag.clone());
        let idle_handle = self.spawn_idle_monitor(stop_flag.clone());

        while !stop_flag.load(Ordering::SeqCst) {
            if let Some((_, frame)) = self.stream.read(self.config.frame_read_timeout) {
                self.process_frame(frame);
            }
        }

        let _ = status_handle.join();
        let _ = idle_handle.join();
    }

    fn spawn_status_publisher(&self, stop_flag: Arc<AtomicBool>) -> JoinHandle<()> {
        let controller = self.controller.clone();
        let tx = self.event_tx.clone();
        let interval = self.config.status_publish_interval;
        let seq = self.event_seq.clone();
        thread::spawn(move || {
            while !stop_flag.load(Ordering::SeqCst) {
                thread::sleep(interval);
                let state = controller.current_state();
                let event = PtzStatusEvent {
                    event_id: next_event_id(&seq),
                    timestamp: Utc::now(),
                    pan: state.pan,
                    tilt: state.tilt,
                    zoom: state.zoom,
                    is_moving: state.is_moving,
                };
                let _ = tx.send(BusEvent::PtzStatus(event));
            }
        })
    }

    fn spawn_idle_monitor(&self, stop_flag: Arc<AtomicBool>) -> JoinHandle<()> {
        let controller = self.controller.clone();
        let interval = self.config.idle_monitor_interval;
        thread::spawn(move || {
            while !stop_flag.load(Ordering::SeqCst) {
                thread::sleep(interval);
                if let Err(err) = controller.tick_idle_monitor() {
                    tracing::warn!(%err, "idle monitor tick failed");
                }
            }
        })
    }

    /// One pass of the main loop: detect, track, pick a target, then either capture it
    /// or steer toward it. Never blocks on the bus — a full channel only drops events.
    pub fn process_frame(&mut self, frame: Frame) -> FrameOutcome {
        let detections = self.detector.detect(&frame);
        for detection in &detections {
            let event = DetectionEvent {
                event_id: self.next_event_id(),
                timestamp: Utc::now(),
                frame_number: frame.frame_number,
                bbox: detection.bbox,
                class: detection.class,
                confidence: detection.confidence,
                frame_w: frame.width,
                frame_h: frame.height,
            };
            let _ = self.event_tx.send(BusEvent::Detection(event));
        }

        let confirmed = self.tracker.update(&detections);
        for track in &confirmed {
            let event = TrackingEvent {
                event_id: self.next_event_id(),
                timestamp: Utc::now(),
                track_id: track.track_id,
                frame_number: frame.frame_number,
                bbox: track.bbox,
                class: track.class,
                confidence: track.confidence,
                velocity: track.velocity,
                trajectory: track.trajectory(),
                age: track.age,
                hits: track.hits,
            };
            let _ = self.event_tx.send(BusEvent::Tracking(event));
        }

        let active_ids: Vec<u64> = confirmed.iter().map(|t| t.track_id).collect();
        self.proposer.cleanup(&active_ids);

        let target = self.prioritizer.select(&confirmed, frame.width as f32, frame.height as f32);
        let new_target_id = target.as_ref().map(|t| t.track_id);
        handle_target_change(&mut self.proposer, self.current_target, new_target_id);
        self.current_target = new_target_id;

        let mut outcome = FrameOutcome { target_track_id: new_target_id, ..Default::default() };

        if let Some(track) = target {
            let plate = self.proposer.estimate_plate_region(&track.bbox);
            let readiness = self.proposer.is_ready_for_capture(track.track_id, &plate);

            if readiness.ready {
                match storage::persist_plate_crop(&self.config.crop_base_dir, track.track_id, &frame, &plate) {
                    Ok(path) => {
                        self.prioritizer.mark_tracked(track.track_id);
                        outcome.captured = true;
                        let event = AnprRequest {
                            request_id: self.next_event_id(),
                            timestamp: Utc::now(),
                            track_id: track.track_id,
                            frame_number: frame.frame_number,
                            crop_path: path.display().to_string(),
                            plate_bbox: plate,
                            vehicle_bbox: track.bbox,
                            class: track.class,
                        };
                        let _ = self.event_tx.send(BusEvent::AnprRequest(event));
                    }
                    Err(err) => {
                        tracing::warn!(%err, track_id = track.track_id, "failed to persist plate crop");
                    }
                }
            } else {
                let (tx, ty) = track.bbox.center();
                let pointed = self.controller.point_to_target(
                    tx,
                    ty,
                    frame.width as f32,
                    frame.height as f32,
                    track.track_id,
                );
                if pointed {
                    outcome.ptz_command_sent = true;
                    self.emit_command(PtzCommandKind::MoveRelative, Some(track.track_id));
                }

                if readiness.zoom_factor > 1.2 {
                    let zoomed = self.controller.zoom_to_target(
                        plate.height(),
                        self.config.target_plate_height,
                        track.track_id,
                    );
                    if zoomed {
                        outcome.ptz_command_sent = true;
                        self.emit_command(PtzCommandKind::Zoom, Some(track.track_id));
                    }
                }
            }
        }

        outcome
    }

    fn emit_command(&self, kind: PtzCommandKind, target_track_id: Option<u64>) {
        let event = PtzCommandEvent {
            event_id: self.next_event_id(),
            timestamp: Utc::now(),
            command: kind,
            pan: None,
            tilt: None,
            zoom: None,
            preset_id: None,
            target_track_id,
        };
        let _ = self.event_tx.send(BusEvent::PtzCommand(event));
    }

    fn next_event_id(&self) -> String {
        next_event_id(&self.event_seq)
    }
}

fn next_event_id(seq: &AtomicU64) -> String {
    let n = seq.fetch_add(1, Ordering::Relaxed);
    format!("evt-{}-{}", Utc::now().timestamp_millis(), n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ScriptedDetector;
    use crate::plate_proposer::PlateProposerConfig;
    use crate::prioritizer::Strategy;
    use crate::ptz::controller::PtzControllerConfig;
    use crate::ptz::device::test_double::RecordingDevice;
    use crate::ptz::preset_manager::PresetManagerConfig;
    use crate::stream::StreamIngestConfig;
    use crate::tracker::TrackerConfig;
    use crate::types::{BoundingBox, Detection, VehicleClass};
    use std::collections::VecDeque;

    fn frame(n: u64) -> Frame {
        Frame { frame_number: n, width: 1280, height: 720, data: Vec::new() }
    }

    fn lone_car() -> Detection {
        Detection {
            bbox: BoundingBox::new(500.0, 300.0, 780.0, 600.0),
            class: VehicleClass::Car,
            confidence: 0.9,
        }
    }

    fn build(proposer_cfg: PlateProposerConfig) -> (Pipeline, Arc<RecordingDevice>, flume::Receiver<BusEvent>) {
        let device = Arc::new(RecordingDevice::with_presets(vec![]));
        let controller = Arc::new(PtzController::new(
            device.clone(),
            PtzControllerConfig {
                hysteresis_pixels: 0.0,
                pan_speed: 0.5,
                tilt_speed: 0.5,
                zoom_step: 0.1,
                move_rate_limit: Duration::from_millis(0),
            },
            vec![],
            PresetManagerConfig {
                idle_enabled: false,
                idle_timeout: Duration::from_secs(9999),
                default_preset_token: "1".into(),
                sweep_enabled: false,
                sweep_interval: Duration::from_secs(9999),
            },
        ));

        let stream = StreamIngest::new(StreamIngestConfig {
            primary_url: "unused".into(),
            backup_url: None,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 1,
            buffer_size: 1,
        });
        let detector: Box<dyn ObjectDetector> =
            Box::new(ScriptedDetector { frames: VecDeque::from(vec![vec![lone_car()]]) });
        let tracker = Tracker::new(TrackerConfig { iou_threshold: 0.3, max_age: 30, min_hits: 1 });
        let prioritizer = Prioritizer::new(Strategy::Proximity, 0.0);
        let proposer = PlateProposer::new(proposer_cfg);
        let (tx, rx) = flume::unbounded();
        let config = PipelineConfig {
            frame_read_timeout: Duration::from_millis(10),
            status_publish_interval: Duration::from_secs(9999),
            idle_monitor_interval: Duration::from_secs(9999),
            crop_base_dir: std::env::temp_dir(),
            target_plate_height: 60.0,
        };

        let pipeline = Pipeline::new(stream, detector, tracker, prioritizer, proposer, controller, tx, config);
        (pipeline, device, rx)
    }

    #[test]
    fn ready_target_persists_crop_and_emits_anpr_request() {
        let (mut pipeline, _device, rx) = build(PlateProposerConfig {
            min_plate_height_pixels: 0.0,
            target_plate_height: 1.0,
            stability_frames: 1,
        });

        let outcome = pipeline.process_frame(frame(1));
        assert!(outcome.captured);
        assert!(!outcome.ptz_command_sent);

        let events: Vec<BusEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, BusEvent::AnprRequest(_))));
        assert!(events.iter().any(|e| matches!(e, BusEvent::Tracking(_))));
    }

    #[test]
    fn unready_target_steers_and_zooms_the_camera() {
        let (mut pipeline, device, rx) = build(PlateProposerConfig {
            min_plate_height_pixels: 10_000.0,
            target_plate_height: 10_000.0,
            stability_frames: 1,
        });

        let outcome = pipeline.process_frame(frame(1));
        assert!(!outcome.captured);
        assert!(outcome.ptz_command_sent);

        assert!(device.calls().iter().any(|c| c.starts_with("relative_move")));
        let events: Vec<BusEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, BusEvent::PtzCommand(_))));
    }

    #[test]
    fn no_detections_leaves_target_memory_clear() {
        let (mut pipeline, _device, _rx) = build(PlateProposerConfig {
            min_plate_height_pixels: 0.0,
            target_plate_height: 1.0,
            stability_frames: 1,
        });
        pipeline.detector = Box::new(ScriptedDetector { frames: VecDeque::from(vec![vec![]]) });

        let outcome = pipeline.process_frame(frame(1));
        assert_eq!(outcome.target_track_id, None);
        assert_eq!(pipeline.current_target, None);
    }
}
