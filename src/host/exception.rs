//! Host exceptions and their mapping to and from native errors

use std::fmt;

use super::value::HostValue;
use crate::native::NativeError;

/// Exception type raised for native errors
pub const NATIVE_ERROR_TYPE: &str = "GLib.Error";

#[derive(Clone)]
pub struct HostException {
    type_name: String,
    message: String,
    attrs: Vec<(String, HostValue)>,
}

impl HostException {
    pub fn new(type_name: &str, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.to_string(),
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<HostValue>) -> Self {
        self.attrs.retain(|(n, _)| n != name);
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    /// Exception carrying the three native error fields
    pub fn from_native_error(err: &NativeError) -> Self {
        Self::new(NATIVE_ERROR_TYPE, err.message.clone())
            .with_attr("domain", err.domain.as_str())
            .with_attr("code", err.code)
            .with_attr("message", err.message.as_str())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attr(&self, name: &str) -> Option<&HostValue> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Native error built from `domain`, `code` and `message` attributes.
    ///
    /// Missing or mistyped attributes produce a binding-domain error that
    /// describes the problem instead.
    pub fn to_native_error(&self) -> NativeError {
        match self.native_fields() {
            Ok((domain, code, message)) => NativeError::new(domain, code, message),
            Err(problem) => NativeError::new(
                NativeError::BINDING_DOMAIN,
                NativeError::CODE_INVALID_EXCEPTION,
                format!("{}: {} ({})", self.type_name, self.message, problem),
            ),
        }
    }

    fn native_fields(&self) -> Result<(&str, i32, &str), String> {
        let domain = match self.attr("domain") {
            Some(HostValue::Str(s)) => s.as_ref(),
            Some(other) => return Err(format!("'domain' must be str, not {}", other.type_name())),
            None => return Err("missing 'domain' attribute".to_string()),
        };
        let code = match self.attr("code") {
            Some(HostValue::Int(v)) => i32::try_from(*v)
                .map_err(|_| format!("'code' {} does not fit a native int", v))?,
            Some(other) => return Err(format!("'code' must be int, not {}", other.type_name())),
            None => return Err("missing 'code' attribute".to_string()),
        };
        let message = match self.attr("message") {
            Some(HostValue::Str(s)) => s.as_ref(),
            Some(other) => return Err(format!("'message' must be str, not {}", other.type_name())),
            None => return Err("missing 'message' attribute".to_string()),
        };
        Ok((domain, code, message))
    }
}

impl fmt::Debug for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostException")
            .field("type_name", &self.type_name)
            .field("message", &self.message)
            .field("attrs", &self.attrs)
            .finish()
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}
