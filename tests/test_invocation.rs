use gimarshal::native::{AllocKind, NativeFrame, NativeString};
use gimarshal::{
    ArgInfo, CallableInfo, ErrorKind, HostValue, NativeFn, NativeValue, Runtime, RuntimeConfig, Transfer, TypeInfo,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

fn int(frame: &NativeFrame<'_>, index: usize) -> i64 {
    frame.arg(index).as_i128().unwrap_or(0) as i64
}

/// Registers `Demo.clamp(a, b, c = 10) -> int64`
fn register_clamp(rt: &Runtime) {
    let clamp = NativeFn::new(|frame| {
        let (value, low, high) = (int(frame, 0), int(frame, 1), int(frame, 2));
        frame.set_return(NativeValue::Int64(value.max(low).min(high)));
        true
    });
    let info = CallableInfo::function("Demo", "clamp", clamp)
        .arg(ArgInfo::new("a", TypeInfo::int32()))
        .arg(ArgInfo::new("b", TypeInfo::int32()))
        .arg(ArgInfo::new("c", TypeInfo::int32()).optional().with_default(NativeValue::Int32(10)))
        .returns(TypeInfo::int64(), Transfer::Nothing)
        .build();
    rt.repository().register_callable(info);
}

#[test]
fn test_keyword_positional_combination() {
    let rt = runtime();
    register_clamp(&rt);
    let mut guard = rt.host_lock().acquire();

    // c falls back to its default
    let result = rt.call(&mut guard, "Demo", "clamp", &[HostValue::Int(50), HostValue::Int(2)], &[]).unwrap();
    assert_eq!(result, HostValue::Int(10));

    let result = rt
        .call(&mut guard, "Demo", "clamp", &[HostValue::Int(50)], &[("c", HostValue::Int(40)), ("b", HostValue::Int(0))])
        .unwrap();
    assert_eq!(result, HostValue::Int(40));

    let err = rt
        .call(&mut guard, "Demo", "clamp", &[HostValue::Int(1), HostValue::Int(2)], &[("b", HostValue::Int(9))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.message().contains("multiple values for keyword argument 'b'"));

    let err = rt
        .call(&mut guard, "Demo", "clamp", &[HostValue::Int(1), HostValue::Int(2)], &[("d", HostValue::Int(1))])
        .unwrap_err();
    assert!(err.message().contains("'d'"));

    let err = rt.call(&mut guard, "Demo", "missing", &[], &[]).unwrap_err();
    assert_eq!(err.message(), "module 'Demo' has no attribute 'missing'");
}

#[test]
fn test_output_framing() {
    let rt = runtime();
    let mut guard = rt.host_lock().acquire();

    // One return, no out args: bare value
    let answer = CallableInfo::function(
        "Demo",
        "answer",
        NativeFn::new(|frame| {
            frame.set_return(NativeValue::Int32(42));
            true
        }),
    )
    .returns(TypeInfo::int32(), Transfer::Nothing)
    .build();
    assert_eq!(gimarshal::invoke(&rt, &mut guard, &answer, &[], &[]).unwrap(), HostValue::Int(42));

    // Void return, one out arg: bare value, not a 1-tuple
    let single_out = CallableInfo::function(
        "Demo",
        "get_size",
        NativeFn::new(|frame| {
            frame.set_out(0, NativeValue::UInt32(7));
            true
        }),
    )
    .arg(ArgInfo::new("size", TypeInfo::uint32()).out())
    .build();
    assert_eq!(gimarshal::invoke(&rt, &mut guard, &single_out, &[], &[]).unwrap(), HostValue::Int(7));

    // Return plus two out args: return first
    let triple = CallableInfo::function(
        "Demo",
        "get_name_and_pos",
        NativeFn::new(|frame| {
            let name = NativeString::from_text(frame.heap(), "cursor");
            frame.set_out(0, NativeValue::Int32(3));
            frame.set_out(1, NativeValue::Int32(4));
            frame.set_return(NativeValue::String(Some(name)));
            true
        }),
    )
    .arg(ArgInfo::new("x", TypeInfo::int32()).out())
    .arg(ArgInfo::new("y", TypeInfo::int32()).out())
    .returns(TypeInfo::utf8(), Transfer::Everything)
    .build();
    let result = gimarshal::invoke(&rt, &mut guard, &triple, &[], &[]).unwrap();
    assert_eq!(
        result,
        HostValue::tuple(vec![HostValue::str("cursor"), HostValue::Int(3), HostValue::Int(4)])
    );
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_fixed_size_array_enforced() {
    let rt = runtime();
    let mut guard = rt.host_lock().acquire();
    let info = CallableInfo::function(
        "Demo",
        "set_rgb",
        NativeFn::new(|frame| frame.arg(0).as_array().is_some_and(|a| a.len() == 3)),
    )
    .arg(ArgInfo::new("rgb", TypeInfo::c_array(TypeInfo::uint8()).with_fixed_size(3)))
    .build();

    let rgb = |n: usize| HostValue::list((0..n).map(|i| HostValue::Int(i as i128)).collect::<Vec<_>>());

    for n in [2, 4] {
        let err = gimarshal::invoke(&rt, &mut guard, &info, &[rgb(n)], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(err.message(), format!("Must contain 3 items, not {}", n));
    }
    assert_eq!(gimarshal::invoke(&rt, &mut guard, &info, &[rgb(3)], &[]).unwrap(), HostValue::None);
    assert_eq!(rt.heap().live_count(), 0);
}

#[test]
fn test_partial_array_failure_cleans_earlier_items() {
    let rt = runtime();
    let mut guard = rt.host_lock().acquire();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let info = CallableInfo::function(
        "Demo",
        "set_names",
        NativeFn::new(move |_| {
            flag.store(true, Ordering::SeqCst);
            true
        }),
    )
    .arg(ArgInfo::new("names", TypeInfo::c_array(TypeInfo::utf8()).zero_terminated()))
    .build();

    let names = HostValue::list(vec![
        HostValue::str("a"),
        HostValue::str("b"),
        HostValue::Int(3),
        HostValue::str("d"),
        HostValue::str("e"),
    ]);
    let err = gimarshal::invoke(&rt, &mut guard, &info, &[names], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.message(), "Item 2: Must be string, not int");
    assert!(!called.load(Ordering::SeqCst));

    // Items 0 and 1 were allocated and released; 3 and 4 never touched
    let stats = rt.heap().stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.frees, 2);
    assert_eq!(stats.live, 0);
    assert_eq!(rt.stats().marshal_failures, 1);
}

#[test]
fn test_failure_surfaces_one_error_and_frees_storage() {
    let rt = runtime();
    let mut guard = rt.host_lock().acquire();
    let info = CallableInfo::function(
        "Demo",
        "load",
        NativeFn::new(|frame| {
            frame.set_error("demo-io-error", 2, "device not ready");
            false
        }),
    )
    .arg(ArgInfo::new("path", TypeInfo::filename()).transfer(Transfer::Everything))
    .arg(ArgInfo::new("contents", TypeInfo::utf8()).out().transfer(Transfer::Everything))
    .throws()
    .build();

    let err = gimarshal::invoke(&rt, &mut guard, &info, &[HostValue::str("/dev/null")], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Native);
    assert_eq!(err.to_string(), "demo-io-error (2): device not ready");
    assert_eq!(rt.heap().live_of(AllocKind::String), 0);
    assert_eq!(rt.heap().stats().double_frees, 0);
}

#[test]
fn test_repeated_calls_reuse_cache() {
    let rt = runtime();
    register_clamp(&rt);
    let mut guard = rt.host_lock().acquire();
    for i in 0..5 {
        let args = [HostValue::Int(i), HostValue::Int(0), HostValue::Int(3)];
        let result = rt.call(&mut guard, "Demo", "clamp", &args, &[]).unwrap();
        assert_eq!(result, HostValue::Int(i.min(3)));
    }
    let stats = rt.stats();
    assert_eq!(stats.calls_made, 5);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 4);
    assert_eq!(stats.marshal_failures + stats.native_failures, 0);
}
