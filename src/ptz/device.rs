//! The boundary to the physical camera. The core only needs the handful of operations
//! below; it never needs to know whether the device speaks ONVIF/SOAP or a vendor HTTP
//! API, so those concerns live behind this trait and out of the controller entirely.

use crate::error::DeviceError;
use crate::types::Preset;

#[derive(Debug, Clone, Copy, Default)]
pub struct PtzStatus {
    pub pan: f32,
    pub tilt: f32,
    pub zoom: f32,
}

pub trait PtzDevice: Send + Sync {
    fn absolute_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), DeviceError>;
    fn relative_move(&self, pan: f32, tilt: f32, zoom: f32, speed: f32) -> Result<(), DeviceError>;
    fn continuous_move(&self, pan_speed: f32, tilt_speed: f32, zoom_speed: f32) -> Result<(), DeviceError>;
    fn stop(&self) -> Result<(), DeviceError>;
    fn get_status(&self) -> Result<PtzStatus, DeviceError>;
    fn get_presets(&self) -> Result<Vec<Preset>, DeviceError>;
    fn goto_preset(&self, token: &str) -> Result<(), DeviceError>;
}

/// A camera reachable over a plain HTTP control surface — the host/port/credentials a
/// `ptz.onvif` config section names, carried here as a struct rather than a full
/// SOAP/ONVIF stack, since no such crate exists in this project's dependency lineage and
/// the controller only cares about the seven operations above.
pub struct HttpPtzDevice {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::blocking::Client,
}

impl HttpPtzDevice {
    pub fn new(host: &str, port: u16, username: String, password: String, timeout_seconds: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .expect("building the PTZ HTTP client should never fail on valid input");
        Self { base_url: format!("http://{host}:{port}"), username, password, client }
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::blocking::Response, DeviceError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()?;
        if !resp.status().is_success() {
            return Err(DeviceError::Refused(format!("{} returned {}", path, resp.status())));
        }
        Ok(resp)
    }
}

impl PtzDevice for HttpPtzDevice {
    fn absolute_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), DeviceError> {
        self.post("/ptz/absolute", serde_json::json!({ "pan": pan, "tilt": tilt, "zoom": zoom }))?;
        Ok(())
    }

    fn relative_move(&self, pan: f32, tilt: f32, zoom: f32, speed: f32) -> Result<(), DeviceError> {
        self.post(
            "/ptz/relative",
            serde_json::json!({ "pan": pan, "tilt": tilt, "zoom": zoom, "speed": speed }),
        )?;
        Ok(())
    }

    fn continuous_move(&self, pan_speed: f32, tilt_speed: f32, zoom_speed: f32) -> Result<(), DeviceError> {
        self.post(
            "/ptz/continuous",
            serde_json::json!({ "pan_speed": pan_speed, "tilt_speed": tilt_speed, "zoom_speed": zoom_speed }),
        )?;
        Ok(())
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.post("/ptz/stop", serde_json::json!({}))?;
        Ok(())
    }

    fn get_status(&self) -> Result<PtzStatus, DeviceError> {
        let resp = self
            .client
            .get(format!("{}/ptz/status", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        Ok(resp.json::<PtzStatus>().unwrap_or_default())
    }

    fn get_presets(&self) -> Result<Vec<Preset>, DeviceError> {
        let resp = self
            .client
            .get(format!("{}/ptz/presets", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        Ok(resp.json::<Vec<Preset>>().unwrap_or_default())
    }

    fn goto_preset(&self, token: &str) -> Result<(), DeviceError> {
        self.post("/ptz/preset/goto", serde_json::json!({ "token": token }))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_double {
    use super::*;
    use std::sync::Mutex;

    /// Records every call it receives; never refuses. Used by controller/preset-manager
    /// unit tests so they never touch the network.
    #[derive(Default)]
    pub struct RecordingDevice {
        pub calls: Mutex<Vec<String>>,
        pub status: Mutex<PtzStatus>,
        pub presets: Vec<Preset>,
    }

    impl RecordingDevice {
        pub fn with_presets(presets: Vec<Preset>) -> Self {
            Self { presets, ..Default::default() }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PtzDevice for RecordingDevice {
        fn absolute_move(&self, pan: f32, tilt: f32, zoom: f32) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(format!("absolute_move({pan},{tilt},{zoom})"));
            let mut s = self.status.lock().unwrap();
            *s = PtzStatus { pan, tilt, zoom };
            Ok(())
        }

        fn relative_move(&self, pan: f32, tilt: f32, zoom: f32, speed: f32) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(format!("relative_move({pan},{tilt},{zoom},{speed})"));
            Ok(())
        }

        fn continuous_move(&self, pan_speed: f32, tilt_speed: f32, zoom_speed: f32) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(format!("continuous_move({pan_speed},{tilt_speed},{zoom_speed})"));
            Ok(())
        }

        fn stop(&self) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }

        fn get_status(&self) -> Result<PtzStatus, DeviceError> {
            Ok(*self.status.lock().unwrap())
        }

        fn get_presets(&self) -> Result<Vec<Preset>, DeviceError> {
            Ok(self.presets.clone())
        }

        fn goto_preset(&self, token: &str) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(format!("goto_preset({token})"));
            Ok(())
        }
    }
}
