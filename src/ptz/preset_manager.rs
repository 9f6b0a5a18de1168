//! Preset enumeration plus the idle/sweep state machine. Owned as a field of the
//! controller (Design Notes: one-way ownership avoids a controller↔preset-manager
//! reference cycle); the idle-monitor thread reaches it only through the controller's
//! lock, never directly.

use std::time::{Duration, Instant};

use crate::types::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraActivity {
    Active,
    Idle,
    Sweeping,
}

pub struct PresetManagerConfig {
    pub idle_enabled: bool,
    pub idle_timeout: Duration,
    pub default_preset_token: String,
    pub sweep_enabled: bool,
    pub sweep_interval: Duration,
}

/// An action the preset manager decided on but cannot itself execute — it doesn't hold
/// a device handle; the controller issues the command and reports the outcome back via
/// `mark_activity`/no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum PresetAction {
    GotoToken(String),
}

pub struct PresetManager {
    presets: Vec<Preset>,
    current_index: usize,
    config: PresetManagerConfig,
    activity: CameraActivity,
    last_activity_time: Instant,
    last_sweep_time: Instant,
}

impl PresetManager {
    pub fn new(presets: Vec<Preset>, config: PresetManagerConfig, now: Instant) -> Self {
        Self {
            presets,
            current_index: 0,
            config,
            activity: CameraActivity::Active,
            last_activity_time: now,
            last_sweep_time: now,
        }
    }

    pub fn activity(&self) -> CameraActivity {
        self.activity
    }

    pub fn presets_in_order(&self) -> &[Preset] {
        &self.presets
    }

    /// Any successful point/zoom/goto command resets the idle clock and returns the
    /// camera to `Active`.
    pub fn mark_activity(&mut self, now: Instant) {
        self.last_activity_time = now;
        self.activity = CameraActivity::Active;
    }

    fn token_by_index(&self, index: usize) -> Option<&str> {
        self.presets.get(index).map(|p| p.token.as_str())
    }

    /// Called ~1 Hz by the idle monitor. Returns the device action to take, if any; the
    /// caller (the controller, under its lock) is responsible for issuing it.
    pub fn tick(&mut self, now: Instant) -> Option<PresetAction> {
        match self.activity {
            CameraActivity::Active => {
                if self.config.idle_enabled
                    && now.duration_since(self.last_activity_time) > self.config.idle_timeout
                {
                    self.activity = CameraActivity::Idle;
                    self.last_sweep_time = now;
                    return Some(PresetAction::GotoToken(self.config.default_preset_token.clone()));
                }
                None
            }
            CameraActivity::Idle | CameraActivity::Sweeping => {
                if !self.config.sweep_enabled {
                    return None;
                }
                if now.duration_since(self.last_sweep_time) >= self.config.sweep_interval {
                    self.current_index = (self.current_index + 1) % self.presets.len().max(1);
                    self.last_sweep_time = now;
                    self.activity = CameraActivity::Sweeping;
                    return self.token_by_index(self.current_index).map(|t| PresetAction::GotoToken(t.to_string()));
                }
                None
            }
        }
    }
}
