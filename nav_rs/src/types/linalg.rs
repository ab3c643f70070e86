//! Linear algebra type system for the navigation filter
//!
//! Fixed-size aliases so every Kalman product is dimension-checked at
//! compile time and lives on the stack.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 23;

// ===== Flat state layout =====
pub const POSITION: usize = 0;
pub const VELOCITY: usize = 3;
pub const ACCELERATION: usize = 6;
pub const ORIENTATION: usize = 9; // (w, x, y, z)
pub const ROTATION_RATE: usize = 13;
pub const ROTATION_AXIS: usize = 14;
pub const GRAVITY: usize = 17;
pub const MAGNETIC_FIELD: usize = 20;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM: usize = 3; // every sensor reports a 3-vector

// ===== 23-State Filter Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

// Measurement types
pub type MeasVec = SVector<f64, MEASURE_DIM>;
pub type MeasNoise = SMatrix<f64, MEASURE_DIM, MEASURE_DIM>;

// Kalman gain types
pub type KalmanGain = SMatrix<f64, STATE_DIM, MEASURE_DIM>; // 23×3

// Jacobian types
pub type MeasJacobian = SMatrix<f64, MEASURE_DIM, STATE_DIM>; // 3×23
