use jni::JNIEnv;
use nav_rs::NavError;
use thiserror::Error;

/// Binding-shell error types
///
/// Filter rejections normally surface as status code 1; these are the
/// failures that reach Java as exceptions.
#[derive(Error, Debug, Clone)]
pub enum NavBindingError {
    #[error("No filter registered for handle {0}")]
    Uninitialized(i64),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Filter(#[from] NavError),
}

impl From<jni::errors::Error> for NavBindingError {
    fn from(err: jni::errors::Error) -> Self {
        NavBindingError::JniError(err.to_string())
    }
}

/// Result type for JNI operations
pub type JResult<T> = Result<T, NavBindingError>;

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &NavBindingError) -> JResult<()> {
    env.throw_new(exception_class(error), error.to_string())
        .map_err(|_| NavBindingError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

fn exception_class(error: &NavBindingError) -> &'static str {
    match error {
        NavBindingError::Uninitialized(_) | NavBindingError::Filter(_) => {
            "java/lang/IllegalStateException"
        }
        NavBindingError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        NavBindingError::JniError(_) | NavBindingError::Internal(_) => {
            "java/lang/RuntimeException"
        }
    }
}
