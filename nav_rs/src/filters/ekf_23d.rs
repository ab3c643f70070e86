//! 23-Dimensional Extended Kalman Filter
//!
//! Fuses GPS, accelerometer, gyroscope and magnetometer readings, each
//! arriving on its own clock, into one NavState expressed in the local ENU
//! frame of a fixed geodetic origin.
//!
//! Every operation first propagates to the event timestamp, so the filter
//! only moves forward in time: events older than the filter are rejected
//! without touching state or covariance.

use nalgebra::{Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{isotropic, FilterConfig, OrientationUpdate};
use crate::error::{NavError, NavResult};
use crate::geodesy::{Lla, LocalFrame};
use crate::state::{rotation_vector_exp, NavState, MIN_AXIS_NORM};
use crate::types::{
    KalmanGain, MeasJacobian, MeasNoise, Sensor, SensorEvent, StateMat, StateVec, ACCELERATION,
    GRAVITY, MAGNETIC_FIELD, ORIENTATION, POSITION, ROTATION_AXIS, ROTATION_RATE, STATE_DIM,
    VELOCITY,
};

/// Outcome of an applied measurement correction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Innovation {
    pub sensor: Sensor,
    /// Measurement minus prediction, in sensor units
    pub residual: Vector3<f64>,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub covariance: Matrix3<f64>,
    /// Normalized innovation squared yᵀ·S⁻¹·y
    pub nis: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ekf23dState {
    /// Filter time [seconds]
    pub time: f64,

    /// Position in local frame (East, North, Up) relative to origin [meters]
    pub position: (f64, f64, f64),

    /// Position as geodetic coordinates
    pub geodetic: Lla,

    /// Velocity in local frame [m/s]
    pub velocity: (f64, f64, f64),

    /// Acceleration in local frame [m/s²]
    pub acceleration: (f64, f64, f64),

    /// Quaternion (w, x, y, z) representing attitude
    pub quaternion: (f64, f64, f64, f64),

    /// Angular speed [rad/s] and unit rotation axis
    pub rotation_rate: f64,
    pub rotation_axis: (f64, f64, f64),

    /// Gravity estimate [m/s²]
    pub gravity: (f64, f64, f64),

    /// Magnetic field estimate [µT]
    pub magnetic_field: (f64, f64, f64),

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    /// Update counters
    pub gps_updates: u64,
    pub accel_updates: u64,
    pub gyro_updates: u64,
    pub mag_updates: u64,
    pub rejected_events: u64,
}

/// Below this angular speed [rad/s] the rotation axis is re-seeded from the
/// gyroscope reading before linearizing
pub const AXIS_SEED_RATE: f64 = 1e-3;

pub struct Ekf23d {
    /// Filter time [seconds]
    time: f64,

    /// Local tangent frame anchored at the reference origin
    frame: LocalFrame,

    /// State estimate
    state: NavState,

    /// Covariance matrix [23x23]
    covariance: StateMat,

    /// Process noise spectral density [23x23], scaled by dt on propagation
    process_noise: StateMat,

    /// Measurement noise covariances [3x3]
    r_gps: MeasNoise,
    r_accel: MeasNoise,
    r_gyro: MeasNoise,
    r_mag: MeasNoise,

    orientation_update: OrientationUpdate,
    innovation_gate: Option<f64>,

    /// Update counters
    gps_updates: u64,
    accel_updates: u64,
    gyro_updates: u64,
    mag_updates: u64,
    rejected_events: u64,
}

impl Ekf23d {
    /// Create a filter at time `t0` [seconds] anchored at `origin`
    pub fn new(t0: f64, origin: Lla, config: &FilterConfig) -> Self {
        Self {
            time: t0,
            frame: LocalFrame::new(origin),
            state: config.initial_state.clone(),
            covariance: config.initial_covariance(),
            process_noise: config.process_noise(),
            r_gps: config.gps_covariance(),
            r_accel: config.accelerometer_covariance(),
            r_gyro: config.gyroscope_covariance(),
            r_mag: config.magnetometer_covariance(),
            orientation_update: config.orientation_update,
            innovation_gate: config.innovation_gate,
            gps_updates: 0,
            accel_updates: 0,
            gyro_updates: 0,
            mag_updates: 0,
            rejected_events: 0,
        }
    }

    pub fn with_defaults(t0: f64, origin: Lla) -> Self {
        Self::new(t0, origin, &FilterConfig::default())
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn origin(&self) -> &Lla {
        self.frame.origin()
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn covariance(&self) -> &StateMat {
        &self.covariance
    }

    // ===== Time propagation =====

    /// Dead-reckon state and covariance forward to `t` [seconds]
    pub fn propagate_to(&mut self, t: f64) -> NavResult<()> {
        if !t.is_finite() {
            return Err(self.reject(NavError::NonFinite { what: "timestamp" }));
        }
        if t < self.time {
            return Err(self.reject(NavError::OutOfOrder {
                requested: t,
                current: self.time,
            }));
        }

        let dt = t - self.time;
        if dt == 0.0 {
            return Ok(());
        }

        // Jacobian at the pre-update state
        let f = self.state.transition_jacobian(dt);
        self.state.advance(dt);

        // P = F * P * F^T + Q * dt
        self.covariance = f * self.covariance * f.transpose() + self.process_noise * dt;
        self.symmetrize_covariance();

        self.time = t;
        Ok(())
    }

    /// Propagate to `t` and return the flat 23-component state
    pub fn state_at(&mut self, t: f64) -> NavResult<[f64; STATE_DIM]> {
        self.propagate_to(t)?;
        let mut out = [0.0; STATE_DIM];
        self.state.write_slice(&mut out);
        Ok(out)
    }

    // ===== Measurement corrections =====

    /// GPS fix; a positive `accuracy_m` replaces the configured GPS noise
    pub fn correct_gps(
        &mut self,
        t: f64,
        fix: &Lla,
        accuracy_m: Option<f64>,
    ) -> NavResult<Innovation> {
        if !fix.is_finite() {
            return Err(self.reject(NavError::NonFinite { what: "gps fix" }));
        }
        self.propagate_to(t)?;

        let z = self.frame.to_enu(fix);
        let r = match accuracy_m {
            Some(acc) if acc.is_finite() && acc > 0.0 => isotropic(acc),
            _ => self.r_gps,
        };
        self.correct(Sensor::Gps, &z, &r)
    }

    /// Specific-force reading [m/s²] in the body frame
    pub fn correct_accelerometer(&mut self, t: f64, reading: &Vector3<f64>) -> NavResult<Innovation> {
        self.check_reading(reading, "accelerometer reading")?;
        self.propagate_to(t)?;
        let r = self.r_accel;
        self.correct(Sensor::Accelerometer, reading, &r)
    }

    /// Angular-rate reading [rad/s] in the body frame
    pub fn correct_gyroscope(&mut self, t: f64, reading: &Vector3<f64>) -> NavResult<Innovation> {
        self.check_reading(reading, "gyroscope reading")?;
        self.propagate_to(t)?;
        self.seed_rotation_axis(reading);
        let r = self.r_gyro;
        self.correct(Sensor::Gyroscope, reading, &r)
    }

    /// Magnetic field reading [µT] in the body frame
    pub fn correct_magnetometer(&mut self, t: f64, reading: &Vector3<f64>) -> NavResult<Innovation> {
        self.check_reading(reading, "magnetometer reading")?;
        self.propagate_to(t)?;
        let r = self.r_mag;
        self.correct(Sensor::Magnetometer, reading, &r)
    }

    /// Route one event to the matching operation
    pub fn apply(&mut self, event: &SensorEvent) -> NavResult<Option<Innovation>> {
        match event {
            SensorEvent::Gps(gps) => self
                .correct_gps(gps.timestamp, &gps.lla(), gps.accuracy())
                .map(Some),
            SensorEvent::Accelerometer(a) => {
                self.correct_accelerometer(a.timestamp, &a.vector()).map(Some)
            }
            SensorEvent::Gyroscope(g) => self.correct_gyroscope(g.timestamp, &g.vector()).map(Some),
            SensorEvent::Magnetometer(m) => {
                self.correct_magnetometer(m.timestamp, &m.vector()).map(Some)
            }
            SensorEvent::Query { timestamp } => self.propagate_to(*timestamp).map(|_| None),
        }
    }

    /// Shared EKF correction against the already-propagated state
    fn correct(&mut self, sensor: Sensor, z: &Vector3<f64>, r: &MeasNoise) -> NavResult<Innovation> {
        let (predicted, h): (Vector3<f64>, MeasJacobian) = match sensor {
            Sensor::Gps => (self.state.predict_gps(), self.state.gps_jacobian()),
            Sensor::Accelerometer => (
                self.state.predict_accelerometer(),
                self.state.accelerometer_jacobian(),
            ),
            Sensor::Gyroscope => (
                self.state.predict_gyroscope(),
                self.state.gyroscope_jacobian(),
            ),
            Sensor::Magnetometer => (
                self.state.predict_magnetometer(),
                self.state.magnetometer_jacobian(),
            ),
        };

        // Innovation: y = z - h(x)
        let residual = z - predicted;

        // Innovation covariance: S = H * P * H^T + R
        let ph_t = self.covariance * h.transpose();
        let s = h * ph_t + r;

        let Some(s_inv) = s
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
        else {
            return Err(self.reject(NavError::SingularInnovation { sensor }));
        };

        let nis = residual.dot(&(s_inv * residual));
        if let Some(gate) = self.innovation_gate {
            if nis > gate {
                return Err(self.reject(NavError::InnovationGated { sensor, nis, gate }));
            }
        }

        // Kalman gain: K = P * H^T * S^-1
        let k: KalmanGain = ph_t * s_inv;
        let dx = k * residual;
        self.apply_correction(&dx);

        // Joseph form keeps covariance PSD
        let i_minus_kh = StateMat::identity() - k * h;
        self.covariance =
            i_minus_kh * self.covariance * i_minus_kh.transpose() + k * r * k.transpose();
        self.symmetrize_covariance();

        match sensor {
            Sensor::Gps => self.gps_updates += 1,
            Sensor::Accelerometer => self.accel_updates += 1,
            Sensor::Gyroscope => self.gyro_updates += 1,
            Sensor::Magnetometer => self.mag_updates += 1,
        }
        log::debug!(
            "{} correction at t={:.6}s: |y|={:.4} nis={:.3}",
            sensor,
            self.time,
            residual.norm(),
            nis
        );

        Ok(Innovation {
            sensor,
            residual,
            covariance: s,
            nis,
        })
    }

    /// x := x ⊕ dx, keeping quaternion and axis on the unit sphere
    fn apply_correction(&mut self, dx: &StateVec) {
        let s = &mut self.state;
        s.position += dx.fixed_rows::<3>(POSITION);
        s.velocity += dx.fixed_rows::<3>(VELOCITY);
        s.acceleration += dx.fixed_rows::<3>(ACCELERATION);
        s.rotation_rate += dx[ROTATION_RATE];
        s.gravity += dx.fixed_rows::<3>(GRAVITY);
        s.magnetic_field += dx.fixed_rows::<3>(MAGNETIC_FIELD);

        let axis = s.rotation_axis.into_inner() + dx.fixed_rows::<3>(ROTATION_AXIS);
        if let Some(axis) = Unit::try_new(axis, MIN_AXIS_NORM) {
            s.rotation_axis = axis;
        }

        let dq = Quaternion::new(
            dx[ORIENTATION],
            dx[ORIENTATION + 1],
            dx[ORIENTATION + 2],
            dx[ORIENTATION + 3],
        );
        match self.orientation_update {
            OrientationUpdate::Multiplicative => {
                // Body-frame rotation vector of the tangent part of dq
                let theta = 2.0 * (s.orientation.quaternion().conjugate() * dq).imag();
                s.orientation *= rotation_vector_exp(&theta);
                s.orientation.renormalize_fast();
            }
            OrientationUpdate::Renormalize => {
                let q = s.orientation.into_inner() + dq;
                if let Some(q) = UnitQuaternion::try_new(q, MIN_AXIS_NORM) {
                    s.orientation = q;
                }
            }
        }
    }

    /// Point the rotation axis along the measured rate while the rate estimate
    /// is near zero
    ///
    /// At zero rate the gyroscope Jacobian only sees the rate along the current
    /// axis. Re-seeding keeps rate·axis projected onto the new axis.
    fn seed_rotation_axis(&mut self, reading: &Vector3<f64>) {
        let s = &mut self.state;
        if s.rotation_rate.abs() >= AXIS_SEED_RATE || reading.norm() < AXIS_SEED_RATE {
            return;
        }
        let Some(axis) = Unit::try_new(s.orientation * reading, MIN_AXIS_NORM) else {
            return;
        };
        s.rotation_rate *= s.rotation_axis.dot(axis.as_ref());
        s.rotation_axis = axis;
        log::debug!("Rotation axis seeded from gyroscope: {:?}", axis.as_ref());
    }

    fn check_reading(&mut self, reading: &Vector3<f64>, what: &'static str) -> NavResult<()> {
        if reading.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(self.reject(NavError::NonFinite { what }))
        }
    }

    /// Count and log a rejected event; state and covariance are untouched
    fn reject(&mut self, err: NavError) -> NavError {
        self.rejected_events += 1;
        log::warn!("Event rejected at filter time t={:.6}s: {}", self.time, err);
        err
    }

    fn symmetrize_covariance(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
    }

    /// Get current state snapshot
    pub fn snapshot(&self) -> Ekf23dState {
        let s = &self.state;
        let q = s.orientation.quaternion();
        let tuple = |v: &Vector3<f64>| (v.x, v.y, v.z);
        Ekf23dState {
            time: self.time,
            position: tuple(&s.position),
            geodetic: self.frame.to_geodetic(&s.position),
            velocity: tuple(&s.velocity),
            acceleration: tuple(&s.acceleration),
            quaternion: (q.w, q.i, q.j, q.k),
            rotation_rate: s.rotation_rate,
            rotation_axis: tuple(s.rotation_axis.as_ref()),
            gravity: tuple(&s.gravity),
            magnetic_field: tuple(&s.magnetic_field),
            covariance_trace: self.covariance.trace(),
            gps_updates: self.gps_updates,
            accel_updates: self.accel_updates,
            gyro_updates: self.gyro_updates,
            mag_updates: self.mag_updates,
            rejected_events: self.rejected_events,
        }
    }
}
