use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::HTTP_TIMEOUT_SECS;

const STATUS_PATH: &str = "/api/system/info";
const SETTINGS_PATH: &str = "/api/system";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("device answered HTTP {0}")]
    Status(u16),
    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeviceError::Timeout
        } else if e.is_decode() {
            DeviceError::Payload(e.to_string())
        } else {
            DeviceError::Network(e.to_string())
        }
    }
}

/// What the controller needs out of `/api/system/info`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Status {
    // °C
    #[serde(rename = "temp", alias = "temperature")]
    pub temperature: f64,
    // MHz
    pub frequency: u32,
}

#[derive(Debug, Serialize)]
struct FrequencyPatch {
    frequency: u32,
}

/// I/O boundary towards the miner. Implementations must not retry:
/// both calls touch hardware state and retrying is the caller's call.
pub trait Device {
    fn read_status(&self) -> Result<Status, DeviceError>;

    fn apply_frequency(&self, frequency: u32) -> Result<(), DeviceError>;
}

impl<D: Device + ?Sized> Device for &D {
    fn read_status(&self) -> Result<Status, DeviceError> {
        (**self).read_status()
    }

    fn apply_frequency(&self, frequency: u32) -> Result<(), DeviceError> {
        (**self).apply_frequency(frequency)
    }
}

/// HTTP client for the Bitaxe AxeOS API
pub struct DeviceClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl DeviceClient {
    /// `address` is a host name, an IP, or a full `http(s)://` base URL
    pub fn new(address: &str) -> Result<Self, DeviceError> {
        Self::with_timeout(address, Duration::from_secs(HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self, DeviceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url(address),
            http,
        })
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

impl Device for DeviceClient {
    fn read_status(&self) -> Result<Status, DeviceError> {
        let response = self
            .http
            .get(format!("{}{STATUS_PATH}", self.base_url))
            .send()?;
        if !response.status().is_success() {
            return Err(DeviceError::Status(response.status().as_u16()));
        }
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| DeviceError::Payload(e.to_string()))
    }

    fn apply_frequency(&self, frequency: u32) -> Result<(), DeviceError> {
        let response = self
            .http
            .patch(format!("{}{SETTINGS_PATH}", self.base_url))
            .json(&FrequencyPatch { frequency })
            .send()?;
        if !response.status().is_success() {
            return Err(DeviceError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
