// Navigation filter Android JNI library
// Exposes the nav_rs filter to Kotlin via JNI, one filter per handle

pub mod android_jni;
pub mod error;
pub mod marshal;
pub mod registry;

pub use error::{JResult, NavBindingError};
pub use registry::FilterRegistry;
