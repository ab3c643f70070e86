pub mod linalg;

pub use linalg::*;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geodesy::Lla;

/// Sensor feeding a measurement correction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Gps,
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Gps => "gps",
            Sensor::Accelerometer => "accelerometer",
            Sensor::Gyroscope => "gyroscope",
            Sensor::Magnetometer => "magnetometer",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccelData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GyroData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MagData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsData {
    pub timestamp: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    /// Horizontal accuracy reported with the fix [meters], non-positive = unknown
    #[serde(default)]
    pub accuracy: f64,
}

impl AccelData {
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl GyroData {
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl MagData {
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl GpsData {
    pub fn lla(&self) -> Lla {
        Lla::new(self.longitude, self.latitude, self.altitude)
    }

    pub fn accuracy(&self) -> Option<f64> {
        (self.accuracy > 0.0).then_some(self.accuracy)
    }
}

/// One timestamped event on the filter's input stream
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Gps(GpsData),
    Accelerometer(AccelData),
    Gyroscope(GyroData),
    Magnetometer(MagData),
    /// Propagate to `timestamp` without a measurement
    Query { timestamp: f64 },
}

impl SensorEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            SensorEvent::Gps(g) => g.timestamp,
            SensorEvent::Accelerometer(a) => a.timestamp,
            SensorEvent::Gyroscope(g) => g.timestamp,
            SensorEvent::Magnetometer(m) => m.timestamp,
            SensorEvent::Query { timestamp } => *timestamp,
        }
    }

    /// Sensor behind the event, `None` for queries
    pub fn sensor(&self) -> Option<Sensor> {
        match self {
            SensorEvent::Gps(_) => Some(Sensor::Gps),
            SensorEvent::Accelerometer(_) => Some(Sensor::Accelerometer),
            SensorEvent::Gyroscope(_) => Some(Sensor::Gyroscope),
            SensorEvent::Magnetometer(_) => Some(Sensor::Magnetometer),
            SensorEvent::Query { .. } => None,
        }
    }
}
