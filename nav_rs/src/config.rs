// Filter tuning
//
// Initial state, initial uncertainty and every noise parameter. Loaded from
// JSON by the replay tool; the JNI shell starts from defaults.

use serde::{Deserialize, Serialize};

use crate::state::NavState;
use crate::types::{MeasNoise, StateMat, StateVec, STATE_DIM};

// ─── Configuration ───────────────────────────────────────────────────────────

/// How the quaternion part of a Kalman correction is applied
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationUpdate {
    /// Map the correction to a body-frame rotation vector and compose it
    #[default]
    Multiplicative,
    /// Add the correction component-wise, then renormalize
    Renormalize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    // ── Prior ──
    pub initial_state: NavState,
    pub initial_covariance_diag: [f64; STATE_DIM],

    // ── Process noise (per second of propagation) ──
    pub process_noise_diag: [f64; STATE_DIM],

    // ── Measurement noise (standard deviations) ──
    pub gps_noise_std: f64,
    pub accel_noise_std: f64,
    pub gyro_noise_std: f64,
    pub mag_noise_std: f64,

    // ── Correction behaviour ──
    pub orientation_update: OrientationUpdate,
    /// Reject corrections whose NIS exceeds this chi-square value (3 dof)
    pub innovation_gate: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        #[rustfmt::skip]
        let initial_covariance_diag = [
            100.0, 100.0, 100.0,    // position: 100 m²
            10.0, 10.0, 10.0,       // velocity: 10 m²/s²
            1.0, 1.0, 1.0,          // acceleration: 1 m²/s⁴
            0.1, 0.1, 0.1, 0.1,     // quaternion (unitless)
            0.1,                    // rotation rate: 0.1 rad²/s²
            0.1, 0.1, 0.1,          // rotation axis (unitless)
            0.1, 0.1, 0.1,          // gravity: 0.1 m²/s⁴
            25.0, 25.0, 25.0,       // magnetic field: 25 µT²
        ];

        // Only the held-constant quantities are driven by noise; position,
        // velocity and orientation pick it up through the transition Jacobian
        #[rustfmt::skip]
        let process_noise_diag = [
            0.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
            1.0, 1.0, 1.0,          // acceleration random walk
            0.0, 0.0, 0.0, 0.0,
            0.1,                    // rotation rate random walk
            0.05, 0.05, 0.05,       // rotation axis wander
            1e-6, 1e-6, 1e-6,       // gravity (near constant)
            1e-3, 1e-3, 1e-3,       // magnetic field (slow disturbances)
        ];

        Self {
            initial_state: NavState::default(),
            initial_covariance_diag,
            process_noise_diag,
            gps_noise_std: 8.0,
            accel_noise_std: 0.3,
            gyro_noise_std: 0.01,
            mag_noise_std: 2.0,
            orientation_update: OrientationUpdate::default(),
            innovation_gate: None,
        }
    }
}

impl FilterConfig {
    /// Defaults with the GPS noise taken from a nominal fix error [meters]
    pub fn with_gps_error(gps_error_m: f64) -> Self {
        let mut config = Self::default();
        if gps_error_m.is_finite() && gps_error_m > 0.0 {
            config.gps_noise_std = gps_error_m;
        }
        config
    }

    pub fn initial_covariance(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::from(self.initial_covariance_diag))
    }

    pub fn process_noise(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::from(self.process_noise_diag))
    }

    pub fn gps_covariance(&self) -> MeasNoise {
        isotropic(self.gps_noise_std)
    }

    pub fn accelerometer_covariance(&self) -> MeasNoise {
        isotropic(self.accel_noise_std)
    }

    pub fn gyroscope_covariance(&self) -> MeasNoise {
        isotropic(self.gyro_noise_std)
    }

    pub fn magnetometer_covariance(&self) -> MeasNoise {
        isotropic(self.mag_noise_std)
    }
}

/// Diagonal covariance with equal variance `std²` on every axis
pub fn isotropic(std: f64) -> MeasNoise {
    MeasNoise::identity() * (std * std)
}
