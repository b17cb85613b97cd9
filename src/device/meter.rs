//! Thermo-hygrometer profile. Read-only.

use super::DeviceProfile;
use crate::config::MeterOptions;
use crate::error::Result;
use crate::input::CommandRequest;
use crate::shadow::{DeviceKind, Observed, Target};
use serde::Deserialize;
use serde_json::Value;

/// Battery is below this level when reported low.
const LOW_BATTERY_LEVEL: u8 = 15;

#[derive(Debug, Default, Deserialize)]
struct MeterStatus {
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    humidity: Option<f32>,
}

/// Fahrenheit to Celsius, to the nearest half degree.
pub fn to_celsius(value: f32) -> f32 {
    ((5.0 / 9.0) * (value - 32.0) * 2.0).round() / 2.0
}

/// Celsius to Fahrenheit, to the nearest degree.
pub fn to_fahrenheit(value: f32) -> f32 {
    (value * 9.0 / 5.0 + 32.0).round()
}

#[derive(Debug, Clone, Default)]
pub struct MeterProfile {
    options: MeterOptions,
}

impl MeterProfile {
    pub fn from_options(options: &MeterOptions) -> Self {
        Self {
            options: options.clone(),
        }
    }
}

impl DeviceProfile for MeterProfile {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Meter
    }

    fn decode_status(&self, body: &Value) -> Result<Observed> {
        // The API has no battery field; an empty body is the only hint.
        let battery = if body.is_null() { 10 } else { 100 };
        let status = if body.is_null() {
            MeterStatus::default()
        } else {
            MeterStatus::deserialize(body)?
        };

        let humidity = status
            .humidity
            .filter(|_| !self.options.hide_humidity)
            .map(|h| h.round().clamp(0.0, 100.0) as u8);

        let temperature = status
            .temperature
            .filter(|_| !self.options.hide_temperature)
            .map(|t| match self.options.unit {
                Some(0) => to_celsius(t),
                Some(1) => to_fahrenheit(t),
                _ => t,
            });

        Ok(Observed {
            temperature,
            humidity,
            battery: Some(battery),
            low_battery: Some(battery < LOW_BATTERY_LEVEL),
            ..Default::default()
        })
    }

    fn validate_target(&self, _target: Target) -> std::result::Result<Target, String> {
        Err("meters are read-only".to_string())
    }

    fn command_for(&self, _target: Target) -> Option<CommandRequest> {
        None
    }
}
