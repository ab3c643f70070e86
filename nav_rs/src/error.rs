use thiserror::Error;

use crate::types::Sensor;

/// Navigation filter error types
///
/// Every variant is recoverable: the filter is left in its last valid,
/// propagated state and the next event can be applied normally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("Out-of-order event: t={requested:.9}s precedes filter time t={current:.9}s")]
    OutOfOrder { requested: f64, current: f64 },

    #[error("Singular innovation covariance in {sensor} correction")]
    SingularInnovation { sensor: Sensor },

    #[error("{sensor} innovation rejected: NIS {nis:.3} exceeds gate {gate:.3}")]
    InnovationGated { sensor: Sensor, nis: f64, gate: f64 },

    #[error("Non-finite input: {what}")]
    NonFinite { what: &'static str },
}

/// Result type for filter operations
pub type NavResult<T> = Result<T, NavError>;
