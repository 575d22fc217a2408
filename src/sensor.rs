//! Analog sensor sampling
//!
//! [`SensorSampler`] takes the two raw reads (pH then ORP) and converts each
//! with [`raw_to_volts`]. Values are uncalibrated volts standing in for pH and
//! millivolt units. No temperature probe is fitted yet, so every reading
//! carries `NaN` for temperature and reports it as unavailable.

use crate::config::SamplerSection;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Sensor read errors
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to read {channel} channel from {path}: {source}")]
    ReadFailed {
        channel: SensorChannel,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed raw value {value:?} on {channel} channel")]
    Malformed { channel: SensorChannel, value: String },
    #[error("Raw value {raw} on {channel} channel exceeds full scale {max_raw}")]
    OutOfScale {
        channel: SensorChannel,
        raw: u16,
        max_raw: u16,
    },
}

/// Which probe a raw read comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorChannel {
    Ph,
    Orp,
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorChannel::Ph => write!(f, "ph"),
            SensorChannel::Orp => write!(f, "orp"),
        }
    }
}

/// One sample of all probes
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device_id: String,
    pub ph: f64,
    pub orp: f64,
    /// `NaN` while no temperature probe is fitted
    pub temperature: f64,
    pub taken_at: DateTime<Utc>,
}

impl Reading {
    /// Temperature if a real value was measured
    pub fn temperature_available(&self) -> Option<f64> {
        self.temperature.is_finite().then_some(self.temperature)
    }
}

/// Raw analog input capability
pub trait AnalogSource: Send {
    fn read_raw(&mut self, channel: SensorChannel) -> Result<u16, SensorError>;
}

/// Linear ADC conversion: `raw / max_raw * reference_voltage`
pub fn raw_to_volts(raw: u16, max_raw: u16, reference_voltage: f64) -> f64 {
    if max_raw == 0 {
        return f64::NAN;
    }
    f64::from(raw) / f64::from(max_raw) * reference_voltage
}

/// Reads both probes and builds a [`Reading`]
pub struct SensorSampler {
    source: Box<dyn AnalogSource>,
    device_id: String,
    max_raw: u16,
    reference_voltage: f64,
}

impl SensorSampler {
    pub fn new(source: Box<dyn AnalogSource>, device_id: &str, config: &SamplerSection) -> Self {
        Self {
            source,
            device_id: device_id.to_string(),
            max_raw: config.max_raw,
            reference_voltage: config.reference_voltage,
        }
    }

    fn read_channel(&mut self, channel: SensorChannel) -> Result<f64, SensorError> {
        let raw = self.source.read_raw(channel)?;
        if raw > self.max_raw {
            return Err(SensorError::OutOfScale {
                channel,
                raw,
                max_raw: self.max_raw,
            });
        }
        Ok(raw_to_volts(raw, self.max_raw, self.reference_voltage))
    }

    pub fn sample(&mut self) -> Result<Reading, SensorError> {
        let ph = self.read_channel(SensorChannel::Ph)?;
        let orp = self.read_channel(SensorChannel::Orp)?;

        Ok(Reading {
            device_id: self.device_id.clone(),
            ph,
            orp,
            temperature: f64::NAN,
            taken_at: Utc::now(),
        })
    }
}

/// Linux IIO ADC: `<device_dir>/in_voltage<N>_raw`
pub struct IioAnalogSource {
    device_dir: PathBuf,
    ph_channel: u8,
    orp_channel: u8,
}

impl IioAnalogSource {
    pub fn new(config: &SamplerSection) -> Self {
        Self {
            device_dir: config.iio_device.clone(),
            ph_channel: config.ph_channel,
            orp_channel: config.orp_channel,
        }
    }

    fn channel_path(&self, channel: SensorChannel) -> PathBuf {
        let index = match channel {
            SensorChannel::Ph => self.ph_channel,
            SensorChannel::Orp => self.orp_channel,
        };
        self.device_dir.join(format!("in_voltage{index}_raw"))
    }
}

impl AnalogSource for IioAnalogSource {
    fn read_raw(&mut self, channel: SensorChannel) -> Result<u16, SensorError> {
        let path = self.channel_path(channel);
        let content = std::fs::read_to_string(&path).map_err(|source| SensorError::ReadFailed {
            channel,
            path: path.display().to_string(),
            source,
        })?;

        content
            .trim()
            .parse::<u16>()
            .map_err(|_| SensorError::Malformed {
                channel,
                value: content.trim().to_string(),
            })
    }
}
