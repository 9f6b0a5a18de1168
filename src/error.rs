//! Typed errors at each component boundary. `main` and the orchestrator compose these
//! into `anyhow::Error` at the point they're reported; internally, callers match on the
//! variant to decide whether a condition is fatal (§7: config missing) or recoverable
//! (everything else).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open video source {url}")]
    OpenFailed { url: String },

    #[error("frame read failed")]
    ReadFailed,

    #[error("primary and backup endpoints both exhausted their reconnect budget")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("PTZ device refused command: {0}")]
    Refused(String),

    #[error("PTZ device request failed")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required configuration key missing: {0}")]
    Missing(String),

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}
