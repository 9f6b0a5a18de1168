//! Translates target geometry into pan/tilt/zoom commands under hysteresis, a
//! move-rate-limit, and an idle/sweep state machine for when nothing is being tracked.
//!
//! Background threads (the idle monitor, the status publisher) only ever touch camera
//! state through this controller, and only while holding its single internal lock —
//! held briefly, and never across a device call (Design Notes).

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::DeviceError;
use crate::ptz::device::PtzDevice;
use crate::ptz::preset_manager::{CameraActivity, PresetAction, PresetManager, PresetManagerConfig};
use crate::types::CameraState;

pub struct PtzControllerConfig {
    pub hysteresis_pixels: f32,
    pub pan_speed: f32,
    pub tilt_speed: f32,
    pub zoom_step: f32,
    pub move_rate_limit: Duration,
}

struct ControllerState {
    zoom: f32,
    last_target: Option<(f32, f32)>,
    last_move_time: Option<Instant>,
    preset_manager: PresetManager,
}

pub struct PtzController {
    device: Arc<dyn PtzDevice>,
    config: PtzControllerConfig,
    state: Mutex<ControllerState>,
}

impl PtzController {
    /// Runs the startup sweep (2 s dwell per preset) before returning, matching the
    /// contract that the main loop only becomes active once every preset has been
    /// visited.
    pub fn new(
        device: Arc<dyn PtzDevice>,
        config: PtzControllerConfig,
        presets: Vec<crate::types::Preset>,
        preset_config: PresetManagerConfig,
    ) -> Self {
        let now = Instant::now();
        let preset_manager = PresetManager::new(presets, preset_config, now);
        let controller = Self {
            device,
            config,
            state: Mutex::new(ControllerState {
                zoom: 0.0,
                last_target: None,
                last_move_time: None,
                preset_manager,
            }),
        };
        controller.startup_sweep();
        controller
    }

    fn startup_sweep(&self) {
        let tokens: Vec<String> = {
            let state = self.state.lock().unwrap();
            state.preset_manager.presets_in_order().iter().map(|p| p.token.clone()).collect()
        };
        for token in tokens {
            if let Err(err) = self.device.goto_preset(&token) {
                tracing::warn!(%token, %err, "startup sweep: preset visit failed");
            }
            thread::sleep(Duration::from_secs(2));
        }
    }

    fn rate_limited(&self, last_move_time: Option<Instant>, now: Instant) -> bool {
        match last_move_time {
            Some(prev) => now.duration_since(prev) < self.config.move_rate_limit,
            None => false,
        }
    }

    /// Issues a relative pan/tilt toward the given pixel. Returns whether a command was
    /// actually sent — `false` covers both hysteresis suppression and rate-limit
    /// refusal; callers must not infer device success from a `true` return either, since
    /// the device call itself can still fail (Open Question c).
    pub fn point_to_target(&self, tx: f32, ty: f32, frame_w: f32, frame_h: f32, track_id: u64) -> bool {
        let now = Instant::now();

        let (pan_offset, tilt_offset) = {
            let state = self.state.lock().unwrap();
            if let Some((last_x, last_y)) = state.last_target {
                if (tx - last_x).abs() < self.config.hysteresis_pixels
                    && (ty - last_y).abs() < self.config.hysteresis_pixels
                {
                    return false;
                }
            }
            if self.rate_limited(state.last_move_time, now) {
                return false;
            }
            (
                (tx - frame_w / 2.0) / frame_w,
                -(ty - frame_h / 2.0) / frame_h,
            )
        };

        let sent = self
            .device
            .relative_move(pan_offset, tilt_offset, 0.0, self.config.pan_speed)
            .is_ok();

        if sent {
            let mut state = self.state.lock().unwrap();
            state.last_target = Some((tx, ty));
            state.last_move_time = Some(now);
            state.preset_manager.mark_activity(now);
            tracing::debug!(track_id, pan_offset, tilt_offset, "pan/tilt command sent");
        }
        sent
    }

    /// Issues a relative zoom toward `desired_h`. Returns whether a command was sent.
    pub fn zoom_to_target(&self, current_h: f32, desired_h: f32, track_id: u64) -> bool {
        let zoom_factor = desired_h / current_h;
        let step = if zoom_factor > 1.2 {
            self.config.zoom_step
        } else if zoom_factor < 0.8 {
            -self.config.zoom_step
        } else {
            return false;
        };

        let now = Instant::now();
        let (new_zoom, rate_limited) = {
            let state = self.state.lock().unwrap();
            ((state.zoom + step).clamp(0.0, 1.0), self.rate_limited(state.last_move_time, now))
        };
        if rate_limited {
            return false;
        }

        let sent = self.device.relative_move(0.0, 0.0, step, 0.3).is_ok();
        if sent {
            let mut state = self.state.lock().unwrap();
            state.zoom = new_zoom;
            state.last_move_time = Some(now);
            state.preset_manager.mark_activity(now);
            tracing::debug!(track_id, new_zoom, "zoom command sent");
        }
        sent
    }

    /// Point, wait for the pan/tilt to settle, then zoom.
    pub fn track_and_zoom(
        &self,
        tx: f32,
        ty: f32,
        frame_w: f32,
        frame_h: f32,
        current_h: f32,
        desired_h: f32,
        track_id: u64,
    ) {
        let pointed = self.point_to_target(tx, ty, frame_w, frame_h, track_id);
        if pointed {
            thread::sleep(Duration::from_millis(500));
        }
        self.zoom_to_target(current_h, desired_h, track_id);
    }

    /// Wide-angle reset. No-op if already near zero zoom. Goes through the same
    /// move-rate-limit gate as every other motion command (Device command envelope).
    pub fn reset_zoom(&self) -> bool {
        let now = Instant::now();
        {
            let state = self.state.lock().unwrap();
            if state.zoom <= 0.1 {
                return false;
            }
            if self.rate_limited(state.last_move_time, now) {
                return false;
            }
        }

        let status = self.device.get_status();
        let (pan, tilt) = status.map(|s| (s.pan, s.tilt)).unwrap_or((0.0, 0.0));
        let sent = self.device.absolute_move(pan, tilt, 0.0).is_ok();
        if sent {
            let mut state = self.state.lock().unwrap();
            state.zoom = 0.0;
            state.last_move_time = Some(now);
            state.preset_manager.mark_activity(now);
        }
        sent
    }

    /// Called ~1 Hz by the idle monitor. Evaluates idle/sweep transitions and, if one
    /// fires, issues the resulting goto-preset — itself subject to the same move-rate-
    /// limit as every other device command, so an idle-return can't fire inside the
    /// dead window a just-refused pan/tilt/zoom already opened.
    pub fn tick_idle_monitor(&self) -> Result<(), DeviceError> {
        let now = Instant::now();
        let (action, rate_limited) = {
            let mut state = self.state.lock().unwrap();
            let action = state.preset_manager.tick(now);
            let rate_limited = self.rate_limited(state.last_move_time, now);
            (action, rate_limited)
        };
        if let Some(PresetAction::GotoToken(token)) = action {
            if rate_limited {
                return Ok(());
            }
            self.device.goto_preset(&token)?;
            let mut state = self.state.lock().unwrap();
            state.last_move_time = Some(now);
        }
        Ok(())
    }

    pub fn activity(&self) -> CameraActivity {
        self.state.lock().unwrap().preset_manager.activity()
    }

    /// Snapshot for the status publisher: software zoom + last target merged with the
    /// device's reported pan/tilt.
    pub fn current_state(&self) -> CameraState {
        let (zoom, last_target) = {
            let state = self.state.lock().unwrap();
            (state.zoom, state.last_target)
        };
        let status = self.device.get_status().unwrap_or_default();
        CameraState {
            pan: status.pan,
            tilt: status.tilt,
            zoom,
            last_target,
            // Open Question (b): never derived from position deltas in the source;
            // kept unimplemented here rather than faked.
            is_moving: false,
        }
    }
}
