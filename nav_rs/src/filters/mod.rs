pub mod ekf_23d;

pub use ekf_23d::{Ekf23d, Ekf23dState, Innovation};
