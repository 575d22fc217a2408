//! Wire format of published readings
//!
//! ```json
//! {"device":"tank1","ph":1.6504,"orp":0.8123,"temp":null}
//! ```
//!
//! Field order is fixed. `ph` and `orp` are written with exactly 4 decimals,
//! `temp` with exactly 2 (`7.0000`, `21.50`); trailing zeros are kept.
//! While no temperature sensor is fitted the reading carries NaN, which goes
//! on the wire as `null`: the temperature is unavailable, not zero.

use crate::sensor::Reading;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

/// Published telemetry document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub device: String,
    #[serde(serialize_with = "serialize_4dp")]
    pub ph: f64,
    #[serde(serialize_with = "serialize_4dp")]
    pub orp: f64,
    #[serde(serialize_with = "serialize_temp")]
    pub temp: Option<f64>,
}

impl TelemetryPayload {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            device: reading.device_id.clone(),
            ph: reading.ph,
            orp: reading.orp,
            temp: reading.temperature_available(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Fixed-point JSON number text, or `None` for NaN and infinities
pub fn fixed_decimals(value: f64, decimals: usize) -> Option<String> {
    value
        .is_finite()
        .then(|| format!("{:.*}", decimals, round_to(value, decimals as i32)))
}

fn serialize_fixed<S: Serializer>(
    value: Option<f64>,
    decimals: usize,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value.and_then(|v| fixed_decimals(v, decimals)) {
        Some(text) => RawValue::from_string(text)
            .map_err(S::Error::custom)?
            .serialize(serializer),
        None => serializer.serialize_none(),
    }
}

fn serialize_4dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_fixed(Some(*value), 4, serializer)
}

fn serialize_temp<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serialize_fixed(*value, 2, serializer)
}
