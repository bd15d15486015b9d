//! Arrays, linked lists and hash tables
//!
//! Elements go through `from_host`/`to_host` recursively. A failure at item i
//! releases what items `[0, i)` produced, leaves later items alone, and is
//! reported as "Item i: <inner error>".

use tracing::trace;

use super::{from_host, release_native, to_host, CleanupData, InContext, Marshaled, OutContext, Owned};
use crate::cache::{ArgCache, ArgKind, ArrayCache, HashCache, ListCache};
use crate::errors::{MarshalError, Result};
use crate::host::HostValue;
use crate::introspection::{ArrayType, Transfer};
use crate::native::{ArrayData, HashStrategy, NativeArray, NativeHashTable, NativeList, NativeValue};

fn sequence_items(value: &HostValue) -> Result<&[HostValue]> {
    match value {
        HostValue::List(items) | HostValue::Tuple(items) => Ok(items),
        other => Err(MarshalError::type_error(format!(
            "Must be sequence, not {}",
            other.type_name()
        ))),
    }
}

fn check_fixed_size(array: &ArrayCache, len: usize) -> Result<()> {
    match array.fixed_size {
        Some(n) if n != len => Err(MarshalError::value_error(format!(
            "Must contain {} items, not {}",
            n, len
        ))),
        _ => Ok(()),
    }
}

/// Marshal every item; on failure undo items already converted
fn items_from_host(ctx: &InContext<'_>, element: &ArgCache, items: &[HostValue]) -> Result<(Vec<NativeValue>, CleanupData)> {
    let mut natives = Vec::with_capacity(items.len() + 1);
    let mut cleanup = CleanupData::new();
    for (i, item) in items.iter().enumerate() {
        match from_host(ctx, element, item) {
            Ok(marshaled) => {
                natives.push(marshaled.value);
                cleanup.merge(marshaled.cleanup);
            }
            Err(err) => {
                trace!(event = "item_failed", index = i, cleaned = cleanup.len());
                cleanup.abort();
                return Err(err.with_prefix(format!("Item {}: ", i)));
            }
        }
    }
    Ok((natives, cleanup))
}

/// Convert items; on failure release the native items not yet converted
fn items_to_host(ctx: &OutContext<'_>, element: &ArgCache, items: Vec<NativeValue>) -> Result<Vec<HostValue>> {
    let mut values = Vec::with_capacity(items.len());
    let mut iter = items.into_iter().enumerate();
    while let Some((i, item)) = iter.next() {
        match to_host(ctx, element, item) {
            Ok(value) => values.push(value),
            Err(err) => {
                for (_, rest) in iter {
                    release_native(element, &rest);
                }
                return Err(err.with_prefix(format!("Item {}: ", i)));
            }
        }
    }
    Ok(values)
}

/// Companion length slot for an array of `len` items
fn push_length(ctx: &InContext<'_>, array: &ArrayCache, len: usize, marshaled: &mut Marshaled) -> Result<()> {
    let (Some(index), Some(callable)) = (array.length_index, ctx.callable) else {
        return Ok(());
    };
    let value = match callable.args.get(index).map(|a| &a.kind) {
        Some(ArgKind::Int(width)) => width.to_native(len as i128).ok_or_else(|| {
            let (min, max) = width.bounds();
            MarshalError::value_error(format!("{} not in range {} to {}", len, min, max))
        })?,
        _ => NativeValue::UInt64(len as u64),
    };
    marshaled.children.push((index, value));
    Ok(())
}

pub(super) fn array_from_host(
    ctx: &InContext<'_>,
    arg: &ArgCache,
    array: &ArrayCache,
    value: &HostValue,
) -> Result<Marshaled> {
    if value.is_none() && arg.allow_none {
        let mut marshaled = Marshaled::plain(NativeValue::Array(None));
        push_length(ctx, array, 0, &mut marshaled)?;
        return Ok(marshaled);
    }

    let (native, len, mut cleanup) = match value {
        // Byte buffers are copied in bulk
        HostValue::Bytes(bytes) if array.is_byte_sized() => {
            check_fixed_size(array, bytes.len())?;
            let mut data = bytes.to_vec();
            if array.zero_terminated {
                data.push(0);
            }
            trace!(event = "array_bulk_copy", len = bytes.len());
            (NativeArray::from_bytes(ctx.heap(), array.array_type, data), bytes.len(), CleanupData::new())
        }
        _ => {
            let items = sequence_items(value)?;
            check_fixed_size(array, items.len())?;
            let (mut natives, cleanup) = items_from_host(ctx, &array.element, items)?;
            if array.zero_terminated {
                natives.push(array.element.kind.zero_value());
            }
            (NativeArray::from_items(ctx.heap(), array.array_type, natives), items.len(), cleanup)
        }
    };

    cleanup.own(arg.transfer, Owned::Memory(native.alloc().clone()));
    let mut marshaled = Marshaled::owned(NativeValue::Array(Some(native)), cleanup);
    if let Err(err) = push_length(ctx, array, len, &mut marshaled) {
        marshaled.cleanup.abort();
        return Err(err);
    }
    Ok(marshaled)
}

/// Logical length of a raw C array: fixed size, then terminator, then companion
fn c_array_length(ctx: &OutContext<'_>, array: &ArrayCache, data: &ArrayData) -> Result<usize> {
    if let Some(n) = array.fixed_size {
        return Ok(n);
    }
    if array.zero_terminated {
        return Ok(match data {
            ArrayData::Items(items) => items.iter().position(NativeValue::is_zero).unwrap_or(items.len()),
            ArrayData::Bytes(bytes) => bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len()),
        });
    }
    if let Some(index) = array.length_index {
        let raw = ctx
            .native_args
            .get(index)
            .and_then(NativeValue::as_i128)
            .ok_or_else(|| MarshalError::value_error(format!("array length argument {} is not set", index)))?;
        return usize::try_from(raw)
            .map_err(|_| MarshalError::value_error(format!("invalid array length {}", raw)));
    }
    Err(MarshalError::type_error("unable to determine array length"))
}

fn empty_array(array: &ArrayCache) -> HostValue {
    if array.is_byte_sized() {
        HostValue::from(Vec::<u8>::new())
    } else {
        HostValue::list(Vec::new())
    }
}

pub(super) fn array_to_host(
    ctx: &OutContext<'_>,
    arg: &ArgCache,
    array: &ArrayCache,
    value: NativeValue,
) -> Result<HostValue> {
    let NativeValue::Array(Some(native)) = value else {
        return Ok(empty_array(array));
    };
    let owns_container = arg.transfer != Transfer::Nothing || arg.is_caller_allocates;
    let data = native.snapshot();

    let length = match array.array_type {
        ArrayType::C => c_array_length(ctx, array, &data),
        _ => Ok(data.len()),
    };
    let result = length.and_then(|len| {
        let len = len.min(data.len());
        match data {
            ArrayData::Bytes(mut bytes) if array.is_byte_sized() => {
                bytes.truncate(len);
                Ok(HostValue::from(bytes))
            }
            ArrayData::Bytes(bytes) => {
                let items = bytes[..len].iter().map(|&b| NativeValue::UInt8(b)).collect();
                items_to_host(ctx, &array.element, items).map(HostValue::list)
            }
            ArrayData::Items(items) if array.is_byte_sized() => Ok(HostValue::from(
                items[..len]
                    .iter()
                    .map(|v| v.as_i128().unwrap_or(0) as u8)
                    .collect::<Vec<u8>>(),
            )),
            ArrayData::Items(mut items) => {
                items.truncate(len);
                items_to_host(ctx, &array.element, items).map(HostValue::list)
            }
        }
    });

    if owns_container {
        native.alloc().free();
    }
    result
}

pub(super) fn list_from_host(ctx: &InContext<'_>, arg: &ArgCache, list: &ListCache, value: &HostValue) -> Result<Marshaled> {
    if value.is_none() && arg.allow_none {
        return Ok(Marshaled::plain(NativeValue::List(None)));
    }
    let items = sequence_items(value)?;
    let (natives, mut cleanup) = items_from_host(ctx, &list.element, items)?;
    let native = NativeList::new(ctx.heap(), list.kind, natives);
    cleanup.own(arg.transfer, Owned::Memory(native.alloc().clone()));
    Ok(Marshaled::owned(NativeValue::List(Some(native)), cleanup))
}

pub(super) fn list_to_host(ctx: &OutContext<'_>, arg: &ArgCache, list: &ListCache, value: NativeValue) -> Result<HostValue> {
    let NativeValue::List(Some(native)) = value else {
        return Ok(HostValue::list(Vec::new()));
    };
    let result = items_to_host(ctx, &list.element, native.items().to_vec()).map(HostValue::list);
    if arg.transfer != Transfer::Nothing {
        native.alloc().free();
    }
    result
}

fn hash_strategy(key: &ArgCache) -> HashStrategy {
    match key.kind {
        ArgKind::Utf8 | ArgKind::Filename => HashStrategy::Str,
        _ => HashStrategy::Direct,
    }
}

pub(super) fn hash_from_host(ctx: &InContext<'_>, arg: &ArgCache, hash: &HashCache, value: &HostValue) -> Result<Marshaled> {
    let entries = match value {
        HostValue::None if arg.allow_none => return Ok(Marshaled::plain(NativeValue::HashTable(None))),
        HostValue::Dict(entries) => entries,
        other => {
            return Err(MarshalError::type_error(format!(
                "Must be dict, not {}",
                other.type_name()
            )))
        }
    };

    let mut natives = Vec::with_capacity(entries.len());
    let mut cleanup = CleanupData::new();
    for (key, val) in entries.iter() {
        let pair = from_host(ctx, &hash.key, key).and_then(|k| match from_host(ctx, &hash.value, val) {
            Ok(v) => Ok((k, v)),
            Err(err) => {
                k.cleanup.abort();
                Err(err)
            }
        });
        match pair {
            Ok((k, v)) => {
                natives.push((k.value, v.value));
                cleanup.merge(k.cleanup);
                cleanup.merge(v.cleanup);
            }
            Err(err) => {
                cleanup.abort();
                return Err(err);
            }
        }
    }

    let native = NativeHashTable::new(ctx.heap(), hash_strategy(&hash.key), natives);
    cleanup.own(arg.transfer, Owned::Memory(native.alloc().clone()));
    Ok(Marshaled::owned(NativeValue::HashTable(Some(native)), cleanup))
}

pub(super) fn hash_to_host(ctx: &OutContext<'_>, arg: &ArgCache, hash: &HashCache, value: NativeValue) -> Result<HostValue> {
    let NativeValue::HashTable(Some(native)) = value else {
        return Ok(HostValue::dict(Vec::new()));
    };

    let mut entries = Vec::with_capacity(native.entries().len());
    let mut failure = None;
    for (key, val) in native.entries().iter().cloned() {
        if failure.is_some() {
            release_native(&hash.key, &key);
            release_native(&hash.value, &val);
            continue;
        }
        match to_host(ctx, &hash.key, key) {
            Ok(k) => match to_host(ctx, &hash.value, val) {
                Ok(v) => entries.push((k, v)),
                Err(err) => failure = Some(err),
            },
            Err(err) => {
                release_native(&hash.value, &val);
                failure = Some(err);
            }
        }
    }

    if arg.transfer != Transfer::Nothing {
        native.alloc().free();
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(HostValue::dict(entries)),
    }
}
