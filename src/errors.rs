//! Error taxonomy for the marshaling core
//!
//! Every failure surfaced to a call site is a single `MarshalError`. The kind
//! tells collaborators whether a conversion can never work (`Type`), was out of
//! range (`Value`), or is recognized but not ported (`NotImplemented`).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::host::HostException;
use crate::native::NativeError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, MarshalError>;

#[derive(Debug, Clone, Error)]
pub enum MarshalError {
    /// Host value's type is fundamentally incompatible with the native type
    #[error("TypeError: {0}")]
    Type(String),

    /// Compatible type, but the value is out of range or violates a length constraint
    #[error("ValueError: {0}")]
    Value(String),

    /// Recognized type/direction combination that is not supported yet
    #[error("NotImplementedError: {0}")]
    NotImplemented(String),

    /// No marshaler pair exists for a type while building a cache
    #[error("UnsupportedTypeError: {0}")]
    UnsupportedType(String),

    /// Native storage could not be allocated; never retried
    #[error("MemoryError: {0}")]
    OutOfMemory(String),

    /// Failure reported by native code (domain, code, message)
    #[error("{0}")]
    Native(NativeError),

    /// Exception raised by host code (e.g. inside a callback)
    #[error("{}: {}", .0.type_name(), .0.message())]
    Host(Arc<HostException>),
}

/// Discriminant of `MarshalError`, for matching without payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Type,
    Value,
    NotImplemented,
    UnsupportedType,
    OutOfMemory,
    Native,
    Host,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "TypeError",
            Self::Value => "ValueError",
            Self::NotImplemented => "NotImplementedError",
            Self::UnsupportedType => "UnsupportedTypeError",
            Self::OutOfMemory => "MemoryError",
            Self::Native => "NativeError",
            Self::Host => "HostException",
        };
        f.write_str(name)
    }
}

impl MarshalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedType(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Type(_) => ErrorKind::Type,
            Self::Value(_) => ErrorKind::Value,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::UnsupportedType(_) => ErrorKind::UnsupportedType,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::Native(_) => ErrorKind::Native,
            Self::Host(_) => ErrorKind::Host,
        }
    }

    /// Message text without the kind name
    pub fn message(&self) -> &str {
        match self {
            Self::Type(m)
            | Self::Value(m)
            | Self::NotImplemented(m)
            | Self::UnsupportedType(m)
            | Self::OutOfMemory(m) => m,
            Self::Native(e) => &e.message,
            Self::Host(e) => e.message(),
        }
    }

    /// Prepend context ("Item 2: ", "Argument 0: ") keeping the error kind.
    ///
    /// Native errors keep their domain and code; host exceptions are returned as-is.
    pub fn with_prefix(self, prefix: impl fmt::Display) -> Self {
        match self {
            Self::Type(m) => Self::Type(format!("{}{}", prefix, m)),
            Self::Value(m) => Self::Value(format!("{}{}", prefix, m)),
            Self::NotImplemented(m) => Self::NotImplemented(format!("{}{}", prefix, m)),
            Self::UnsupportedType(m) => Self::UnsupportedType(format!("{}{}", prefix, m)),
            Self::Native(e) => Self::Native(NativeError::new(
                e.domain,
                e.code,
                format!("{}{}", prefix, e.message),
            )),
            other => other,
        }
    }

    /// Convert into the error a native caller sees when host code fails.
    ///
    /// Host exceptions must carry `domain`, `code` and `message` attributes;
    /// anything else becomes a descriptive binding-domain error.
    pub fn to_native_error(&self) -> NativeError {
        match self {
            Self::Native(e) => e.clone(),
            Self::Host(exc) => exc.to_native_error(),
            other => NativeError::new(
                NativeError::BINDING_DOMAIN,
                NativeError::CODE_HOST_FAILURE,
                other.to_string(),
            ),
        }
    }
}

impl From<NativeError> for MarshalError {
    fn from(err: NativeError) -> Self {
        Self::Native(err)
    }
}

impl From<HostException> for MarshalError {
    fn from(exc: HostException) -> Self {
        Self::Host(Arc::new(exc))
    }
}
