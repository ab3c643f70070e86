use jni::objects::{JDoubleArray, JFloatArray};
use jni::JNIEnv;
use nalgebra::Vector3;
use nav_rs::STATE_DIM;

use crate::error::{JResult, NavBindingError};

const NANOS_TO_SECONDS: f64 = 1e-9;

/// Convert a Java nanosecond timestamp to filter seconds
pub fn ns_to_seconds(t_ns: i64) -> f64 {
    t_ns as f64 * NANOS_TO_SECONDS
}

/// Widen a single-precision sensor triple
pub fn reading_from_f32(values: &[f32]) -> JResult<Vector3<f64>> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x as f64, *y as f64, *z as f64)),
        _ => Err(NavBindingError::InvalidParameters(format!(
            "expected 3 sensor values, got {}",
            values.len()
        ))),
    }
}

/// Copy a Java `float[3]` into a reading vector
pub fn read_float3(env: &mut JNIEnv, array: &JFloatArray) -> JResult<Vector3<f64>> {
    if array.is_null() {
        return Err(NavBindingError::InvalidParameters(
            "sensor array is null".to_string(),
        ));
    }
    let len = env.get_array_length(array)? as usize;
    let mut buf = vec![0.0f32; len];
    env.get_float_array_region(array, 0, &mut buf)?;
    reading_from_f32(&buf)
}

/// Write the flat state into a Java `double[23]`
pub fn write_state(env: &mut JNIEnv, out: &JDoubleArray, state: &[f64; STATE_DIM]) -> JResult<()> {
    if out.is_null() {
        return Err(NavBindingError::InvalidParameters(
            "state buffer is null".to_string(),
        ));
    }
    let len = env.get_array_length(out)? as usize;
    if len < STATE_DIM {
        return Err(NavBindingError::InvalidParameters(format!(
            "state buffer holds {len} values, need {STATE_DIM}"
        )));
    }
    env.set_double_array_region(out, 0, state)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ns_to_seconds() {
        assert_eq!(ns_to_seconds(0), 0.0);
        assert_relative_eq!(ns_to_seconds(1_500_000_000), 1.5);
        assert_relative_eq!(ns_to_seconds(-2_000_000), -0.002);
    }

    #[test]
    fn test_reading_from_f32() {
        let v = reading_from_f32(&[0.5, -1.25, 9.81]).unwrap();
        assert_relative_eq!(v, Vector3::new(0.5, -1.25, 9.81f32 as f64));
    }

    #[test]
    fn test_reading_rejects_wrong_length() {
        assert!(matches!(
            reading_from_f32(&[1.0, 2.0]),
            Err(NavBindingError::InvalidParameters(_))
        ));
    }
}
