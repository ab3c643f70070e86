use crate::error::{throw_java_exception, JResult, NavBindingError};
use crate::marshal::{ns_to_seconds, read_float3, write_state};
use crate::registry::FilterRegistry;
use jni::objects::{JClass, JDoubleArray, JFloatArray};
use jni::sys::{jdouble, jint, jlong, jstring};
use jni::JNIEnv;
use nalgebra::Vector3;
use nav_rs::{Ekf23d, FilterConfig, Lla, NavResult, STATE_DIM};
use std::sync::{Mutex, MutexGuard, Once};

/// Status returned to Java: event applied
pub const STATUS_APPLIED: jint = 0;
/// Status returned to Java: event rejected by the filter, filter still usable
pub const STATUS_REJECTED: jint = 1;
/// Status returned to Java: binding failure, a Java exception is pending
pub const STATUS_ERROR: jint = -1;

// Filters persist across JNI calls; Java holds only the handles
lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<FilterRegistry> = Mutex::new(FilterRegistry::new());
}

static LOGGER: Once = Once::new();

fn registry() -> JResult<MutexGuard<'static, FilterRegistry>> {
    REGISTRY.lock().map_err(|_| {
        NavBindingError::Internal("Failed to acquire filter registry lock".to_string())
    })
}

fn init_logging() {
    LOGGER.call_once(|| {
        #[cfg(target_os = "android")]
        {
            let _ = android_log::init("NavFilter");
        }
    });
}

/// Map a filter outcome to a status code; rejections are logged, not thrown
fn status<T>(op: &str, result: NavResult<T>) -> jint {
    match result {
        Ok(_) => STATUS_APPLIED,
        Err(e) => {
            log::warn!("{} rejected: {}", op, e);
            STATUS_REJECTED
        }
    }
}

fn status_or_throw(env: &mut JNIEnv, result: JResult<jint>) -> jint {
    match result {
        Ok(code) => code,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            STATUS_ERROR
        }
    }
}

/// JNI: Create a filter
/// Parameters: start time (ns), origin lon/lat (degrees), alt (m), nominal GPS error (m)
/// Each call registers an independent filter: callers must `release` it, or
/// use `reinitialize` to replace it.
/// Returns: filter handle (> 0), or -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_initialize(
    mut env: JNIEnv,
    _class: JClass,
    start_time_ns: jlong,
    longitude: jdouble,
    latitude: jdouble,
    altitude: jdouble,
    gps_error: jdouble,
) -> jlong {
    init_logging();
    match initialize_impl(start_time_ns, longitude, latitude, altitude, gps_error) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

pub fn initialize_impl(
    start_time_ns: i64,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    gps_error: f64,
) -> JResult<i64> {
    let filter = build_filter(start_time_ns, longitude, latitude, altitude, gps_error)?;
    let handle = registry()?.create(filter);

    log::info!(
        "Filter {} initialized at lat={:.6} lon={:.6} alt={:.1}",
        handle,
        latitude,
        longitude,
        altitude
    );
    Ok(handle)
}

/// JNI: Replace a filter, discarding the one behind `previous`
/// Parameters: previous handle (unknown or 0 = none), then as `initialize`
/// Returns: new filter handle (> 0), or -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_reinitialize(
    mut env: JNIEnv,
    _class: JClass,
    previous: jlong,
    start_time_ns: jlong,
    longitude: jdouble,
    latitude: jdouble,
    altitude: jdouble,
    gps_error: jdouble,
) -> jlong {
    init_logging();
    match reinitialize_impl(previous, start_time_ns, longitude, latitude, altitude, gps_error) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

pub fn reinitialize_impl(
    previous: i64,
    start_time_ns: i64,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    gps_error: f64,
) -> JResult<i64> {
    let filter = build_filter(start_time_ns, longitude, latitude, altitude, gps_error)?;
    let handle = registry()?.replace(previous, filter);

    log::info!("Filter {} re-initialized as {}", previous, handle);
    Ok(handle)
}

fn build_filter(
    start_time_ns: i64,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    gps_error: f64,
) -> JResult<Ekf23d> {
    let origin = Lla::new(longitude, latitude, altitude);
    if !origin.is_finite() || latitude.abs() > 90.0 {
        return Err(NavBindingError::InvalidParameters(format!(
            "invalid origin lon={longitude} lat={latitude} alt={altitude}"
        )));
    }

    let config = FilterConfig::with_gps_error(gps_error);
    Ok(Ekf23d::new(ns_to_seconds(start_time_ns), origin, &config))
}

/// JNI: Drop a filter
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_release(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jint {
    let result = release_impl(handle).map(|_| STATUS_APPLIED);
    status_or_throw(&mut env, result)
}

pub fn release_impl(handle: i64) -> JResult<()> {
    registry()?.release(handle)?;
    log::info!("Filter {} released", handle);
    Ok(())
}

/// JNI: GPS fix
/// Parameters: handle, time (ns), lon/lat (degrees), alt (m), fix error (m)
/// Returns: 0 applied, 1 rejected, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_updateGps(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
    longitude: jdouble,
    latitude: jdouble,
    altitude: jdouble,
    error: jdouble,
) -> jint {
    let result = update_gps_impl(handle, time_ns, longitude, latitude, altitude, error);
    status_or_throw(&mut env, result)
}

pub fn update_gps_impl(
    handle: i64,
    time_ns: i64,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    error: f64,
) -> JResult<jint> {
    let fix = Lla::new(longitude, latitude, altitude);
    let t = ns_to_seconds(time_ns);
    let result = registry()?.with_filter(handle, |ekf| ekf.correct_gps(t, &fix, Some(error)))?;
    Ok(status("GPS update", result))
}

/// JNI: Accelerometer sample
/// Parameters: handle, time (ns), float[3] (m/s²)
/// Returns: 0 applied, 1 rejected, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_updateAccelerometer(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
    reading: JFloatArray,
) -> jint {
    let result =
        read_float3(&mut env, &reading).and_then(|v| update_accelerometer_impl(handle, time_ns, &v));
    status_or_throw(&mut env, result)
}

pub fn update_accelerometer_impl(handle: i64, time_ns: i64, reading: &Vector3<f64>) -> JResult<jint> {
    let t = ns_to_seconds(time_ns);
    let result = registry()?.with_filter(handle, |ekf| ekf.correct_accelerometer(t, reading))?;
    Ok(status("Accelerometer update", result))
}

/// JNI: Gyroscope sample
/// Parameters: handle, time (ns), float[3] (rad/s)
/// Returns: 0 applied, 1 rejected, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_updateGyroscope(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
    reading: JFloatArray,
) -> jint {
    let result =
        read_float3(&mut env, &reading).and_then(|v| update_gyroscope_impl(handle, time_ns, &v));
    status_or_throw(&mut env, result)
}

pub fn update_gyroscope_impl(handle: i64, time_ns: i64, reading: &Vector3<f64>) -> JResult<jint> {
    let t = ns_to_seconds(time_ns);
    let result = registry()?.with_filter(handle, |ekf| ekf.correct_gyroscope(t, reading))?;
    Ok(status("Gyroscope update", result))
}

/// JNI: Magnetometer sample
/// Parameters: handle, time (ns), float[3] (µT)
/// Returns: 0 applied, 1 rejected, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_updateMagnetometer(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
    reading: JFloatArray,
) -> jint {
    let result =
        read_float3(&mut env, &reading).and_then(|v| update_magnetometer_impl(handle, time_ns, &v));
    status_or_throw(&mut env, result)
}

pub fn update_magnetometer_impl(handle: i64, time_ns: i64, reading: &Vector3<f64>) -> JResult<jint> {
    let t = ns_to_seconds(time_ns);
    let result = registry()?.with_filter(handle, |ekf| ekf.correct_magnetometer(t, reading))?;
    Ok(status("Magnetometer update", result))
}

/// JNI: Propagate to a time and copy out the 23-component state
/// Parameters: handle, time (ns), double[23] output buffer
/// Returns: 0 written, 1 rejected (buffer untouched), -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_getState(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
    out: JDoubleArray,
) -> jint {
    let result = get_state_impl(handle, time_ns).and_then(|state| match state {
        Ok(flat) => write_state(&mut env, &out, &flat).map(|_| STATUS_APPLIED),
        Err(e) => Ok(status("State query", Err::<(), _>(e))),
    });
    status_or_throw(&mut env, result)
}

pub fn get_state_impl(handle: i64, time_ns: i64) -> JResult<NavResult<[f64; STATE_DIM]>> {
    let t = ns_to_seconds(time_ns);
    registry()?.with_filter(handle, |ekf| ekf.state_at(t))
}

/// JNI: Propagate to a time and export the state snapshot as JSON
/// Returns: JSON string or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_nav_NavBinding_getStateJson(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    time_ns: jlong,
) -> jstring {
    match get_state_json_impl(handle, time_ns) {
        Ok(json_str) => match env.new_string(&json_str) {
            Ok(jstr) => jstr.into_raw(),
            Err(_) => {
                let _ = throw_java_exception(
                    &mut env,
                    &NavBindingError::JniError("Failed to create Java string".to_string()),
                );
                std::ptr::null_mut()
            }
        },
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

pub fn get_state_json_impl(handle: i64, time_ns: i64) -> JResult<String> {
    let t = ns_to_seconds(time_ns);
    let snapshot = registry()?.with_filter(handle, |ekf| {
        ekf.propagate_to(t).map(|_| ekf.snapshot())
    })??;
    serde_json::to_string(&snapshot)
        .map_err(|e| NavBindingError::Internal(format!("JSON serialization failed: {e}")))
}
