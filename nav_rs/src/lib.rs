//! Inertial/GNSS navigation filter.
//!
//! A 23-state extended Kalman filter fusing GPS fixes with accelerometer,
//! gyroscope and magnetometer readings, expressed in a local East-North-Up
//! frame anchored at a geodetic origin.

pub mod config;
pub mod error;
pub mod filters;
pub mod geodesy;
pub mod state;
pub mod types;

pub use config::{FilterConfig, OrientationUpdate};
pub use error::{NavError, NavResult};
pub use filters::ekf_23d::{Ekf23d, Ekf23dState, Innovation};
pub use geodesy::{Lla, LocalFrame};
pub use state::NavState;
pub use types::{Sensor, SensorEvent, STATE_DIM};
