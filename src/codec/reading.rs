//! Sensor reading translation.
//!
//! Interprets the clear 39-bit payload of a block according to its sensor
//! type. Unknown types produce [`SensorReading::Unrecognized`]; translation
//! never fails.

use serde::Serialize;

use super::block::{payload_sensor_data, payload_sensor_type, TelemetryBlock};

/// DHT11 temperature + humidity.
pub const SENSOR_CLIMATE: u8 = 1;
/// Accelerometer magnitude.
pub const SENSOR_ACCELERATION: u8 = 2;
/// Gyroscope X/Y.
pub const SENSOR_GYROSCOPE: u8 = 3;

const SCALE: f64 = 100.0;

/// Whether `sensor_type` is one the firmware emits.
pub fn is_known_sensor_type(sensor_type: u8) -> bool {
    matches!(
        sensor_type,
        SENSOR_CLIMATE | SENSOR_ACCELERATION | SENSOR_GYROSCOPE
    )
}

/// A decoded sensor value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorReading {
    /// Temperature in °C and relative humidity in %.
    Climate { temperature: f64, humidity: f64 },
    /// Acceleration magnitude in m/s².
    Acceleration { magnitude: f64 },
    /// Angular rate around X and Y in rad/s.
    Gyroscope { x: f64, y: f64 },
    Unrecognized { sensor_type: u8, raw: u32 },
}

impl SensorReading {
    /// Interpret a sensor type and its 32-bit data word.
    pub fn from_parts(sensor_type: u8, data: u32) -> Self {
        let high = (data >> 16) as u16;
        let low = (data & 0xFFFF) as u16;

        match sensor_type {
            SENSOR_CLIMATE => Self::Climate {
                temperature: f64::from(high) / SCALE,
                humidity: f64::from(low) / SCALE,
            },
            SENSOR_ACCELERATION => Self::Acceleration {
                magnitude: f64::from(data) / SCALE,
            },
            SENSOR_GYROSCOPE => Self::Gyroscope {
                x: f64::from(high as i16) / SCALE,
                y: f64::from(low as i16) / SCALE,
            },
            other => Self::Unrecognized {
                sensor_type: other,
                raw: data,
            },
        }
    }

    /// Interpret a clear 39-bit payload.
    pub fn from_payload(payload: u64) -> Self {
        Self::from_parts(payload_sensor_type(payload), payload_sensor_data(payload))
    }

    /// Interpret a clear block. Returns `None` for encrypted blocks.
    pub fn from_block(block: TelemetryBlock) -> Option<Self> {
        Some(Self::from_parts(block.sensor_type()?, block.sensor_data()?))
    }

    /// Scale back to the wire representation.
    ///
    /// Values are rounded to the nearest hundredth and saturate at the
    /// field bounds.
    pub fn to_parts(&self) -> (u8, u32) {
        match *self {
            Self::Climate {
                temperature,
                humidity,
            } => {
                let high = u32::from(scale_u16(temperature));
                let low = u32::from(scale_u16(humidity));
                (SENSOR_CLIMATE, (high << 16) | low)
            }
            Self::Acceleration { magnitude } => {
                let scaled = (magnitude * SCALE).round().clamp(0.0, f64::from(u32::MAX));
                (SENSOR_ACCELERATION, scaled as u32)
            }
            Self::Gyroscope { x, y } => {
                let high = u32::from(scale_i16(x) as u16);
                let low = u32::from(scale_i16(y) as u16);
                (SENSOR_GYROSCOPE, (high << 16) | low)
            }
            Self::Unrecognized { sensor_type, raw } => (sensor_type & 0xF, raw),
        }
    }

    /// Human-readable sensor name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Climate { .. } => "DHT11",
            Self::Acceleration { .. } => "Accelerometer",
            Self::Gyroscope { .. } => "Gyroscope",
            Self::Unrecognized { .. } => "Unknown",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

fn scale_u16(value: f64) -> u16 {
    (value * SCALE).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

fn scale_i16(value: f64) -> i16 {
    (value * SCALE)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
