//! Native error triple (domain, code, message)

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain} ({code}): {message}")]
pub struct NativeError {
    pub domain: String,
    pub code: i32,
    pub message: String,
}

impl NativeError {
    /// Domain for failures the binding reports on behalf of host code
    pub const BINDING_DOMAIN: &'static str = "gimarshal-error-quark";
    pub const CODE_HOST_FAILURE: i32 = 0;
    pub const CODE_INVALID_EXCEPTION: i32 = 1;

    /// Domain for text encoding failures
    pub const CONVERT_DOMAIN: &'static str = "g-convert-error-quark";
    pub const CODE_ILLEGAL_SEQUENCE: i32 = 1;

    pub fn new(domain: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            message: message.into(),
        }
    }

    /// Generic failure for a native call that returned false without an error
    pub fn call_failed(callable: &str) -> Self {
        Self::new(
            Self::BINDING_DOMAIN,
            Self::CODE_HOST_FAILURE,
            format!("{}() failed without setting an error", callable),
        )
    }
}
