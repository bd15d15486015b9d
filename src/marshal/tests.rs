use super::*;
use crate::bridge::HostBoxed;
use crate::cache::{ArrayCache, FloatWidth, HashCache, IntWidth, ListCache, StructCache};
use crate::config::RuntimeConfig;
use crate::errors::ErrorKind;
use crate::host::EnumValue;
use crate::introspection::{ArrayType, Direction, EnumInfo, ListKind, ObjectInfo, StructInfo, StructKind, Transfer};
use crate::native::{AllocKind, BoxedInstance, BoxedVTable, NativeError, NativeObject, NativeString};

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

fn in_ctx(rt: &Arc<Runtime>) -> InContext<'_> {
    InContext {
        runtime: rt,
        callable: None,
        host_args: &[],
        owner: None,
    }
}

fn out_ctx(rt: &Arc<Runtime>) -> OutContext<'_> {
    OutContext {
        runtime: rt,
        callable: None,
        native_args: &[],
    }
}

fn arg(kind: ArgKind, transfer: Transfer) -> ArgCache {
    ArgCache::new("arg", kind, Direction::In, transfer)
}

fn array_of(element: ArgKind, transfer: Transfer, zero_terminated: bool, fixed_size: Option<usize>) -> ArgCache {
    let parent = arg(ArgKind::Void { is_pointer: true }, transfer);
    arg(
        ArgKind::Array(Box::new(ArrayCache {
            element: ArgCache::element("item", element, &parent),
            array_type: ArrayType::C,
            fixed_size,
            zero_terminated,
            length_index: None,
        })),
        transfer,
    )
}

#[test]
fn test_int_range_and_type_errors() {
    let rt = runtime();
    let ctx = in_ctx(&rt);
    let int8 = arg(ArgKind::Int(IntWidth::I8), Transfer::Nothing);

    let ok = from_host(&ctx, &int8, &HostValue::Int(-128)).unwrap();
    assert_eq!(ok.value.as_i128(), Some(-128));

    let err = from_host(&ctx, &int8, &HostValue::Int(200)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.message(), "200 not in range -128 to 127");

    let err = from_host(&ctx, &int8, &HostValue::str("5")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.message(), "Must be number, not str");

    let uint64 = arg(ArgKind::Int(IntWidth::U64), Transfer::Nothing);
    let max = from_host(&ctx, &uint64, &HostValue::Int(u64::MAX as i128)).unwrap();
    assert_eq!(max.value.as_i128(), Some(u64::MAX as i128));
    assert!(from_host(&ctx, &uint64, &HostValue::Int(-1)).is_err());
}

#[test]
fn test_float_range() {
    let rt = runtime();
    let float = arg(ArgKind::Float(FloatWidth::F32), Transfer::Nothing);
    let err = from_host(&in_ctx(&rt), &float, &HostValue::Float(1e300)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);

    let double = arg(ArgKind::Float(FloatWidth::F64), Transfer::Nothing);
    let ok = from_host(&in_ctx(&rt), &double, &HostValue::Int(3)).unwrap();
    assert_eq!(ok.value.as_f64(), Some(3.0));
}

#[test]
fn test_float_infinity_passes_through() {
    let rt = runtime();
    let float = arg(ArgKind::Float(FloatWidth::F32), Transfer::Nothing);
    let ok = from_host(&in_ctx(&rt), &float, &HostValue::Float(f64::INFINITY)).unwrap();
    assert!(matches!(ok.value, NativeValue::Float(f) if f == f32::INFINITY));

    let double = arg(ArgKind::Float(FloatWidth::F64), Transfer::Nothing);
    let ok = from_host(&in_ctx(&rt), &double, &HostValue::Float(f64::NEG_INFINITY)).unwrap();
    assert_eq!(ok.value.as_f64(), Some(f64::NEG_INFINITY));

    let err = from_host(&in_ctx(&rt), &float, &HostValue::Float(-1e300)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn test_boolean_uses_truthiness() {
    let rt = runtime();
    let boolean = arg(ArgKind::Boolean, Transfer::Nothing);
    let cases = [
        (HostValue::list(Vec::new()), false),
        (HostValue::str("x"), true),
        (HostValue::None, false),
        (HostValue::Int(2), true),
    ];
    for (value, expected) in cases {
        let marshaled = from_host(&in_ctx(&rt), &boolean, &value).unwrap();
        assert!(matches!(marshaled.value, NativeValue::Boolean(b) if b == expected), "{:?}", value);
    }
}

#[test]
fn test_unichar_conversion() {
    let rt = runtime();
    let unichar = arg(ArgKind::UniChar, Transfer::Nothing);

    let err = from_host(&in_ctx(&rt), &unichar, &HostValue::str("ab")).unwrap_err();
    assert_eq!(err.message(), "Must be a one character string, not 2 characters");

    let snow = from_host(&in_ctx(&rt), &unichar, &HostValue::str("\u{2603}")).unwrap();
    let back = to_host(&out_ctx(&rt), &unichar, snow.value).unwrap();
    assert_eq!(back, HostValue::str("\u{2603}"));

    let empty = to_host(&out_ctx(&rt), &unichar, NativeValue::UniChar(0)).unwrap();
    assert_eq!(empty, HostValue::str(""));
}

#[test]
fn test_string_cleanup_follows_transfer() {
    let rt = runtime();

    let borrowed = arg(ArgKind::Utf8, Transfer::Nothing);
    let marshaled = from_host(&in_ctx(&rt), &borrowed, &HostValue::str("temp")).unwrap();
    assert_eq!(marshaled.value.as_str(), Some("temp"));
    assert_eq!(rt.heap().live_count(), 1);
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_count(), 0);

    let given = arg(ArgKind::Utf8, Transfer::Everything);
    let marshaled = from_host(&in_ctx(&rt), &given, &HostValue::str("kept")).unwrap();
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_count(), 1);

    // Converting back consumes the transferred string
    let back = to_host(&out_ctx(&rt), &given, marshaled.value).unwrap();
    assert_eq!(back, HostValue::str("kept"));
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_string_rejects_non_text() {
    let rt = runtime();
    let utf8 = arg(ArgKind::Utf8, Transfer::Nothing);
    let err = from_host(&in_ctx(&rt), &utf8, &HostValue::Int(1)).unwrap_err();
    assert_eq!(err.message(), "Must be string, not int");

    // Not nullable
    assert!(from_host(&in_ctx(&rt), &utf8, &HostValue::None).is_err());
    let mut nullable = utf8.clone();
    nullable.allow_none = true;
    let none = from_host(&in_ctx(&rt), &nullable, &HostValue::None).unwrap();
    assert!(none.value.is_zero());
}

#[test]
fn test_filename_embedded_nul() {
    let rt = runtime();
    let filename = arg(ArgKind::Filename, Transfer::Nothing);
    let err = from_host(&in_ctx(&rt), &filename, &HostValue::from(b"ab\0c".to_vec())).unwrap_err();
    match err {
        MarshalError::Native(native) => {
            assert_eq!(native.domain, NativeError::CONVERT_DOMAIN);
            assert_eq!(native.code, NativeError::CODE_ILLEGAL_SEQUENCE);
            assert!(native.message.contains("offset 2"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(rt.heap().live_count(), 0);

    let raw = NativeValue::String(Some(NativeString::new(rt.heap(), vec![0xffu8, 0xfe])));
    let bytes = to_host(&out_ctx(&rt), &filename, raw).unwrap();
    assert_eq!(bytes, HostValue::from(vec![0xffu8, 0xfe]));
}

#[test]
fn test_enum_accepts_unknown_integer() {
    let rt = runtime();
    let color = EnumInfo::new("Test", "Color", &[("RED", 0), ("GREEN", 1)]);
    let enum_arg = arg(ArgKind::Enum(Arc::clone(&color)), Transfer::Nothing);

    let member = from_host(&in_ctx(&rt), &enum_arg, &HostValue::Enum(EnumValue::new(&color, 1))).unwrap();
    assert!(matches!(member.value, NativeValue::Enum(1)));

    let unknown = from_host(&in_ctx(&rt), &enum_arg, &HostValue::Int(42)).unwrap();
    assert!(matches!(unknown.value, NativeValue::Enum(42)));
    assert_eq!(rt.stats().enum_warnings, 1);

    let err = from_host(&in_ctx(&rt), &enum_arg, &HostValue::str("RED")).unwrap_err();
    assert_eq!(err.message(), "Expected Test.Color, but got str");

    let back = to_host(&out_ctx(&rt), &enum_arg, NativeValue::Enum(1)).unwrap();
    match back {
        HostValue::Enum(value) => assert_eq!(value.name(), Some("GREEN")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_flags_reject_unknown_bits() {
    let rt = runtime();
    let mode = EnumInfo::new("Test", "Mode", &[("READ", 1), ("WRITE", 2)]);
    let flags = arg(ArgKind::Flags(mode), Transfer::Nothing);

    assert!(matches!(from_host(&in_ctx(&rt), &flags, &HostValue::Int(3)).unwrap().value, NativeValue::Flags(3)));
    assert!(matches!(from_host(&in_ctx(&rt), &flags, &HostValue::Int(0)).unwrap().value, NativeValue::Flags(0)));
    let err = from_host(&in_ctx(&rt), &flags, &HostValue::Int(8)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.message(), "Expected Test.Mode, but got int");
}

#[test]
fn test_flags_accept_bool_and_whole_float() {
    let rt = runtime();
    let mode = EnumInfo::new("Test", "Mode", &[("READ", 1), ("WRITE", 2)]);
    let flags = arg(ArgKind::Flags(mode), Transfer::Nothing);

    assert!(matches!(from_host(&in_ctx(&rt), &flags, &HostValue::Bool(true)).unwrap().value, NativeValue::Flags(1)));
    assert!(matches!(from_host(&in_ctx(&rt), &flags, &HostValue::Float(2.0)).unwrap().value, NativeValue::Flags(2)));

    let err = from_host(&in_ctx(&rt), &flags, &HostValue::Float(1.5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.message(), "Expected Test.Mode, but got float");
    let err = from_host(&in_ctx(&rt), &flags, &HostValue::Float(8.0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_zero_terminated_array_round_trip() {
    let rt = runtime();
    let array = array_of(ArgKind::Int(IntWidth::I32), Transfer::Nothing, true, None);
    let value = HostValue::list(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);

    let marshaled = from_host(&in_ctx(&rt), &array, &value).unwrap();
    assert_eq!(marshaled.value.as_array().map(|a| a.len()), Some(4));

    let back = to_host(&out_ctx(&rt), &array, marshaled.value.clone()).unwrap();
    assert_eq!(back, value);
    // Borrowed container is still the binding's to free
    assert_eq!(rt.heap().live_of(AllocKind::Array), 1);
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_array_item_failure_releases_earlier_items() {
    let rt = runtime();
    let array = array_of(ArgKind::Utf8, Transfer::Nothing, true, None);
    let value = HostValue::list(vec![HostValue::str("a"), HostValue::Int(5), HostValue::str("c")]);

    let err = from_host(&in_ctx(&rt), &array, &value).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.message(), "Item 1: Must be string, not int");
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_filename_array_item_error_keeps_native_identity() {
    let rt = runtime();
    let array = array_of(ArgKind::Filename, Transfer::Nothing, true, None);
    let value = HostValue::list(vec![HostValue::from(b"a".to_vec()), HostValue::from(b"b\0c".to_vec())]);

    match from_host(&in_ctx(&rt), &array, &value).unwrap_err() {
        MarshalError::Native(native) => {
            assert_eq!(native.domain, NativeError::CONVERT_DOMAIN);
            assert_eq!(native.code, NativeError::CODE_ILLEGAL_SEQUENCE);
            assert!(native.message.starts_with("Item 1: "), "{}", native.message);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_fixed_size_mismatch() {
    let rt = runtime();
    let array = array_of(ArgKind::Int(IntWidth::I32), Transfer::Nothing, false, Some(2));
    let value = HostValue::tuple(vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);
    let err = from_host(&in_ctx(&rt), &array, &value).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.message(), "Must contain 2 items, not 3");

    let err = from_host(&in_ctx(&rt), &array, &HostValue::Int(1)).unwrap_err();
    assert_eq!(err.message(), "Must be sequence, not int");
}

#[test]
fn test_byte_array_bulk_copy() {
    let rt = runtime();
    let array = array_of(ArgKind::Int(IntWidth::U8), Transfer::Everything, false, Some(3));
    let marshaled = from_host(&in_ctx(&rt), &array, &HostValue::from(vec![7u8, 8, 9])).unwrap();
    // Container passes to the callee
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_of(AllocKind::Array), 1);

    let back = to_host(&out_ctx(&rt), &array, marshaled.value).unwrap();
    assert_eq!(back, HostValue::from(vec![7u8, 8, 9]));
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_null_array_is_empty() {
    let rt = runtime();
    let ints = array_of(ArgKind::Int(IntWidth::I32), Transfer::Nothing, true, None);
    assert_eq!(to_host(&out_ctx(&rt), &ints, NativeValue::Array(None)).unwrap(), HostValue::list(Vec::new()));

    let bytes = array_of(ArgKind::Int(IntWidth::U8), Transfer::Nothing, true, None);
    assert_eq!(to_host(&out_ctx(&rt), &bytes, NativeValue::Array(None)).unwrap(), HostValue::from(Vec::<u8>::new()));
}

#[test]
fn test_list_of_strings_everything() {
    let rt = runtime();
    let parent = arg(ArgKind::Void { is_pointer: true }, Transfer::Everything);
    let list = arg(
        ArgKind::List(Box::new(ListCache {
            element: ArgCache::element("item", ArgKind::Utf8, &parent),
            kind: ListKind::Singly,
        })),
        Transfer::Everything,
    );
    let value = HostValue::list(vec![HostValue::str("x"), HostValue::str("y")]);
    let marshaled = from_host(&in_ctx(&rt), &list, &value).unwrap();
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_count(), 3);

    let back = to_host(&out_ctx(&rt), &list, marshaled.value).unwrap();
    assert_eq!(back, value);
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_hash_table_from_dict() {
    let rt = runtime();
    let parent = arg(ArgKind::Void { is_pointer: true }, Transfer::Nothing);
    let hash = arg(
        ArgKind::HashTable(Box::new(HashCache {
            key: ArgCache::element("key", ArgKind::Utf8, &parent),
            value: ArgCache::element("value", ArgKind::Int(IntWidth::I32), &parent),
        })),
        Transfer::Nothing,
    );
    let value = HostValue::dict(vec![(HostValue::str("one"), HostValue::Int(1))]);
    let marshaled = from_host(&in_ctx(&rt), &hash, &value).unwrap();

    match &marshaled.value {
        NativeValue::HashTable(Some(table)) => {
            let key = NativeValue::String(Some(NativeString::from_text(rt.heap(), "one")));
            assert_eq!(table.lookup(&key).and_then(|v| v.as_i128()), Some(1));
            if let NativeValue::String(Some(s)) = key {
                s.alloc().free();
            }
        }
        other => panic!("unexpected {:?}", other),
    }
    let back = to_host(&out_ctx(&rt), &hash, marshaled.value.clone()).unwrap();
    assert_eq!(back, value);
    marshaled.cleanup.finish();
    assert_eq!(rt.heap().live_count(), 0);

    let err = from_host(&in_ctx(&rt), &hash, &HostValue::list(Vec::new())).unwrap_err();
    assert_eq!(err.message(), "Must be dict, not list");
}

#[test]
fn test_struct_type_check_and_copy() {
    let rt = runtime();
    let rect = StructInfo::new("Test", "Rect", StructKind::Boxed);
    let point = StructInfo::new("Test", "Point", StructKind::Boxed);
    let native = BoxedInstance::new(rt.heap(), "Test.Rect", BoxedVTable::plain());
    let wrapper = HostValue::Boxed(HostBoxed::new(&rect, Arc::clone(&native), true));

    let wrong = arg(ArgKind::Struct(StructCache { info: point, foreign: None }), Transfer::Nothing);
    let err = from_host(&in_ctx(&rt), &wrong, &wrapper).unwrap_err();
    assert_eq!(err.message(), "Expected Test.Point, but got Test.Rect");

    let given = arg(
        ArgKind::Struct(StructCache { info: Arc::clone(&rect), foreign: None }),
        Transfer::Everything,
    );
    let marshaled = from_host(&in_ctx(&rt), &given, &wrapper).unwrap();
    let copy = marshaled.value.as_boxed().cloned().unwrap();
    assert!(!Arc::ptr_eq(&copy, &native));
    assert_eq!(rt.heap().live_of(AllocKind::Boxed), 2);

    // Failure before the call releases the copy
    marshaled.cleanup.abort();
    assert_eq!(rt.heap().live_of(AllocKind::Boxed), 1);
    drop(wrapper);
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_foreign_struct_uses_converter() {
    let rt = runtime();
    let info = StructInfo::foreign("Test", "Surface");
    rt.foreign().register_foreign(
        "Test",
        "Surface",
        |_, value, _| match value {
            HostValue::Int(v) => Ok(NativeValue::Pointer(*v as usize)),
            other => Err(MarshalError::type_error(format!("Expected surface, got {}", other.type_name()))),
        },
        |value, _| Ok(HostValue::Int(value.as_i128().unwrap_or(0))),
        |_| {},
    );
    let marshaler = rt.foreign().lookup("Test", "Surface");
    let surface = arg(ArgKind::Struct(StructCache { info, foreign: marshaler }), Transfer::Nothing);

    let marshaled = from_host(&in_ctx(&rt), &surface, &HostValue::Int(0x40)).unwrap();
    assert!(matches!(marshaled.value, NativeValue::Pointer(0x40)));
    assert_eq!(marshaled.cleanup.len(), 1);
    marshaled.cleanup.finish();

    assert_eq!(to_host(&out_ctx(&rt), &surface, NativeValue::Pointer(0)).unwrap(), HostValue::None);
    assert_eq!(to_host(&out_ctx(&rt), &surface, NativeValue::Pointer(9)).unwrap(), HostValue::Int(9));
}

#[test]
fn test_object_type_check_and_transfer() {
    let rt = runtime();
    let base = Arc::new(ObjectInfo::new("Test", "Base", None));
    let derived = Arc::new(ObjectInfo::new("Test", "Derived", Some(Arc::clone(&base))));
    let other = Arc::new(ObjectInfo::new("Test", "Other", None));

    let obj = NativeObject::new(rt.heap(), Arc::clone(&derived), false);
    let wrapper = HostValue::Object(rt.wrappers().wrap(&obj, Transfer::Nothing));
    assert_eq!(obj.ref_count(), 2);

    let wrong = arg(ArgKind::Object(other), Transfer::Nothing);
    let err = from_host(&in_ctx(&rt), &wrong, &wrapper).unwrap_err();
    assert_eq!(err.message(), "Expected Test.Other, but got Test.Derived");

    let given = arg(ArgKind::Object(base), Transfer::Everything);
    let marshaled = from_host(&in_ctx(&rt), &given, &wrapper).unwrap();
    assert_eq!(obj.ref_count(), 3);
    marshaled.cleanup.abort();
    assert_eq!(obj.ref_count(), 2);

    // A returned reference lands on the same wrapper
    obj.acquire();
    let back = to_host(&out_ctx(&rt), &given, NativeValue::Object(Some(Arc::clone(&obj)))).unwrap();
    assert_eq!(obj.ref_count(), 2);
    assert!(Arc::ptr_eq(back.as_object().unwrap(), wrapper.as_object().unwrap()));
}

#[test]
fn test_error_kind_directions() {
    let rt = runtime();
    let error = arg(ArgKind::Error, Transfer::Everything);
    let err = from_host(&in_ctx(&rt), &error, &HostValue::None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);

    let native = NativeError::new("test-domain", 4, "failed");
    match to_host(&out_ctx(&rt), &error, NativeValue::Error(Some(native.clone()))).unwrap() {
        HostValue::Exception(exc) => assert_eq!(exc.to_native_error(), native),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_release_native_frees_owned_items() {
    let rt = runtime();
    let strings = array_of(ArgKind::Utf8, Transfer::Everything, true, None);
    let items = vec![
        NativeValue::String(Some(NativeString::from_text(rt.heap(), "a"))),
        NativeValue::String(Some(NativeString::from_text(rt.heap(), "b"))),
        NativeValue::String(None),
    ];
    let native = crate::native::NativeArray::from_items(rt.heap(), ArrayType::C, items);
    assert_eq!(rt.heap().live_count(), 3);

    release_native(&strings, &NativeValue::Array(Some(native)));
    assert_eq!(rt.heap().live_count(), 0);
}
