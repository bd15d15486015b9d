//! Scalars, text, enums and flags

use std::sync::Arc;
use tracing::warn;

use super::{CleanupData, InContext, Marshaled, Owned};
use crate::cache::{ArgCache, FloatWidth, IntWidth};
use crate::errors::{MarshalError, Result};
use crate::host::{EnumValue, FlagsValue, HostValue};
use crate::introspection::{EnumInfo, Transfer};
use crate::native::{NativeError, NativeString, NativeValue};

/// Host truthiness
pub(super) fn truthy(value: &HostValue) -> bool {
    match value {
        HostValue::None => false,
        HostValue::Bool(b) => *b,
        HostValue::Int(v) => *v != 0,
        HostValue::Float(v) => *v != 0.0,
        HostValue::Str(s) => !s.is_empty(),
        HostValue::Bytes(b) => !b.is_empty(),
        HostValue::List(items) | HostValue::Tuple(items) => !items.is_empty(),
        HostValue::Dict(entries) => !entries.is_empty(),
        HostValue::Enum(e) => e.value != 0,
        HostValue::Flags(f) => f.value != 0,
        HostValue::Pointer(p) => *p != 0,
        HostValue::Object(_) | HostValue::Boxed(_) | HostValue::Callable(_) | HostValue::Exception(_) => true,
    }
}

pub(super) fn void_from_host(is_pointer: bool, value: &HostValue) -> Result<NativeValue> {
    if !is_pointer {
        return Ok(NativeValue::Void);
    }
    match value {
        HostValue::None => Ok(NativeValue::Pointer(0)),
        HostValue::Pointer(p) => Ok(NativeValue::Pointer(*p)),
        HostValue::Int(v) => usize::try_from(*v)
            .map(NativeValue::Pointer)
            .map_err(|_| MarshalError::value_error(format!("{} is not a valid pointer", v))),
        other => Err(MarshalError::type_error(format!(
            "Must be a pointer, not {}",
            other.type_name()
        ))),
    }
}

/// Numeric coercion shared by integer-like kinds
fn coerce_int(value: &HostValue) -> Result<i128> {
    match value {
        HostValue::Int(v) => Ok(*v),
        HostValue::Bool(b) => Ok(i128::from(*b)),
        HostValue::Float(f) if f.is_finite() => Ok(f.trunc() as i128),
        HostValue::Float(f) => Err(MarshalError::value_error(format!(
            "cannot convert float {} to integer",
            f
        ))),
        HostValue::Enum(e) => Ok(i128::from(e.value)),
        HostValue::Flags(f) => Ok(i128::from(f.value)),
        other => Err(MarshalError::type_error(format!(
            "Must be number, not {}",
            other.type_name()
        ))),
    }
}

pub(super) fn int_from_host(width: IntWidth, value: &HostValue) -> Result<NativeValue> {
    let v = coerce_int(value)?;
    width.to_native(v).ok_or_else(|| {
        let (min, max) = width.bounds();
        MarshalError::value_error(format!("{} not in range {} to {}", v, min, max))
    })
}

pub(super) fn float_from_host(width: FloatWidth, value: &HostValue) -> Result<NativeValue> {
    let v = match value {
        HostValue::Float(f) => *f,
        HostValue::Int(i) => *i as f64,
        HostValue::Bool(b) => f64::from(u8::from(*b)),
        other => {
            return Err(MarshalError::type_error(format!(
                "Must be number, not {}",
                other.type_name()
            )))
        }
    };
    let max = match width {
        FloatWidth::F32 => f64::from(f32::MAX),
        FloatWidth::F64 => f64::MAX,
    };
    if v.is_finite() && (v < -max || v > max) {
        return Err(MarshalError::value_error(format!(
            "{:e} not in range {:e} to {:e}",
            v, -max, max
        )));
    }
    Ok(match width {
        FloatWidth::F32 => NativeValue::Float(v as f32),
        FloatWidth::F64 => NativeValue::Double(v),
    })
}

pub(super) fn unichar_from_host(arg: &ArgCache, value: &HostValue) -> Result<NativeValue> {
    match value {
        HostValue::None if arg.allow_none => Ok(NativeValue::UniChar(0)),
        HostValue::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(NativeValue::UniChar(c as u32)),
                _ => Err(MarshalError::type_error(format!(
                    "Must be a one character string, not {} characters",
                    s.chars().count()
                ))),
            }
        }
        other => Err(MarshalError::type_error(format!(
            "Must be a unicode string, not {}",
            other.type_name()
        ))),
    }
}

pub(super) fn utf8_from_host(ctx: &InContext<'_>, arg: &ArgCache, value: &HostValue) -> Result<Marshaled> {
    match value {
        HostValue::None if arg.allow_none => Ok(Marshaled::plain(NativeValue::String(None))),
        HostValue::Str(s) => Ok(owned_string(arg.transfer, NativeString::from_text(ctx.heap(), s))),
        other => Err(MarshalError::type_error(format!(
            "Must be string, not {}",
            other.type_name()
        ))),
    }
}

pub(super) fn filename_from_host(ctx: &InContext<'_>, arg: &ArgCache, value: &HostValue) -> Result<Marshaled> {
    let bytes: &[u8] = match value {
        HostValue::None if arg.allow_none => return Ok(Marshaled::plain(NativeValue::String(None))),
        HostValue::Str(s) => s.as_bytes(),
        HostValue::Bytes(b) => b,
        other => {
            return Err(MarshalError::type_error(format!(
                "Must be string or bytes, not {}",
                other.type_name()
            )))
        }
    };
    // Native filenames are NUL-terminated byte strings
    if let Some(pos) = bytes.iter().position(|&b| b == 0) {
        return Err(NativeError::new(
            NativeError::CONVERT_DOMAIN,
            NativeError::CODE_ILLEGAL_SEQUENCE,
            format!("Embedded NUL byte in filename at offset {}", pos),
        )
        .into());
    }
    Ok(owned_string(arg.transfer, NativeString::new(ctx.heap(), bytes)))
}

fn owned_string(transfer: Transfer, string: NativeString) -> Marshaled {
    let mut cleanup = CleanupData::new();
    cleanup.own(transfer, Owned::Memory(string.alloc().clone()));
    Marshaled::owned(NativeValue::String(Some(string)), cleanup)
}

pub(super) fn enum_from_host(ctx: &InContext<'_>, info: &Arc<EnumInfo>, value: &HostValue) -> Result<NativeValue> {
    let raw = match value {
        HostValue::Enum(e) if e.info.full_name() == info.full_name() => return Ok(NativeValue::Enum(e.value)),
        HostValue::Int(_) | HostValue::Bool(_) => coerce_int(value)?,
        other => return Err(expected(&info.full_name(), other)),
    };
    let v = i64::try_from(raw).map_err(|_| {
        MarshalError::value_error(format!("{} not in range {} to {}", raw, i64::MIN, i64::MAX))
    })?;
    if !info.is_member(v) {
        // Tolerated: unknown values are passed through
        ctx.runtime.record_enum_warning();
        if ctx.runtime.config().invoke.warn_on_unknown_enum {
            warn!(event = "unknown_enum_value", enum_type = %info.full_name(), value = v);
        }
    }
    Ok(NativeValue::Enum(v))
}

pub(super) fn flags_from_host(info: &Arc<EnumInfo>, value: &HostValue) -> Result<NativeValue> {
    match value {
        HostValue::Flags(f) if f.info.full_name() == info.full_name() => Ok(NativeValue::Flags(f.value)),
        HostValue::Float(f) if f.fract() != 0.0 => Err(expected(&info.full_name(), value)),
        HostValue::Int(_) | HostValue::Bool(_) | HostValue::Float(_) => match u64::try_from(coerce_int(value)?) {
            Ok(bits) if bits == 0 || info.covers_bits(bits) => Ok(NativeValue::Flags(bits)),
            _ => Err(expected(&info.full_name(), value)),
        },
        other => Err(expected(&info.full_name(), other)),
    }
}

pub(super) fn expected(type_name: &str, value: &HostValue) -> MarshalError {
    MarshalError::type_error(format!("Expected {}, but got {}", type_name, value.type_name()))
}

pub(super) fn int_to_host(value: &NativeValue) -> Result<HostValue> {
    value
        .as_i128()
        .map(HostValue::Int)
        .ok_or_else(|| MarshalError::type_error(format!("native slot {:?} is not an integer", value)))
}

pub(super) fn float_to_host(value: &NativeValue) -> Result<HostValue> {
    value
        .as_f64()
        .map(HostValue::Float)
        .ok_or_else(|| MarshalError::type_error(format!("native slot {:?} is not a float", value)))
}

pub(super) fn unichar_to_host(value: &NativeValue) -> Result<HostValue> {
    let code = match value {
        NativeValue::UniChar(c) => *c,
        other => return Err(MarshalError::type_error(format!("native slot {:?} is not a unichar", other))),
    };
    if code == 0 {
        return Ok(HostValue::str(""));
    }
    char::from_u32(code)
        .map(|c| HostValue::from(c.to_string()))
        .ok_or_else(|| MarshalError::value_error(format!("{:#x} is not a valid code point", code)))
}

/// Free a returned string the binding now owns
fn consume_string(transfer: Transfer, string: &NativeString) {
    if transfer == Transfer::Everything {
        string.alloc().free();
    }
}

pub(super) fn utf8_to_host(arg: &ArgCache, value: NativeValue) -> Result<HostValue> {
    let NativeValue::String(Some(string)) = value else {
        return Ok(HostValue::None);
    };
    let result = match string.to_str() {
        Some(text) => Ok(HostValue::str(text)),
        None => Err(MarshalError::value_error(format!(
            "{}: invalid UTF-8 in native string",
            arg.name
        ))),
    };
    consume_string(arg.transfer, &string);
    result
}

pub(super) fn filename_to_host(arg: &ArgCache, value: NativeValue) -> Result<HostValue> {
    let NativeValue::String(Some(string)) = value else {
        return Ok(HostValue::None);
    };
    let result = match string.to_str() {
        Some(text) => HostValue::str(text),
        None => HostValue::from(string.bytes().to_vec()),
    };
    consume_string(arg.transfer, &string);
    Ok(result)
}

pub(super) fn enum_to_host(info: &Arc<EnumInfo>, value: &NativeValue) -> Result<HostValue> {
    let raw = value
        .as_i128()
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| MarshalError::type_error(format!("native slot {:?} is not an enum", value)))?;
    Ok(HostValue::Enum(EnumValue::new(info, raw)))
}

pub(super) fn flags_to_host(info: &Arc<EnumInfo>, value: &NativeValue) -> Result<HostValue> {
    let raw = value
        .as_i128()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| MarshalError::type_error(format!("native slot {:?} is not a flags value", value)))?;
    Ok(HostValue::Flags(FlagsValue::new(info, raw)))
}
