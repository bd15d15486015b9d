use gimarshal::native::{
    AllocKind, BoxedInstance, BoxedVTable, DestroyNotify, NativeBoxed, NativeCallback, NativeClosure, NativeFrame,
    NativeObject, NativeObjectRef,
};
use gimarshal::{
    ArgInfo, CallableInfo, HostCallable, HostValue, NativeFn, NativeValue, ObjectInfo, OwnershipState, Runtime,
    RuntimeConfig, ScopeType, StructInfo, Transfer, TypeInfo,
};
use gimarshal::introspection::StructKind;
use parking_lot::Mutex;
use std::sync::Arc;

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

fn button_class() -> Arc<ObjectInfo> {
    Arc::new(ObjectInfo::new("Demo", "Button", None))
}

#[test]
fn test_wrapper_identity_is_unique() {
    let rt = runtime();
    let obj = NativeObject::new(rt.heap(), button_class(), false);

    let first = rt.wrappers().wrap(&obj, Transfer::Nothing);
    let second = rt.wrappers().wrap(&obj, Transfer::Nothing);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(Arc::strong_count(&first), 2);
    // One reference for the caller, one for the wrapper
    assert_eq!(obj.ref_count(), 2);

    drop(first);
    drop(second);
    assert_eq!(obj.ref_count(), 1);
    assert!(rt.wrappers().is_empty());
}

#[test]
fn test_concurrent_wrap_yields_one_wrapper() {
    let rt = runtime();
    let obj = NativeObject::new(rt.heap(), button_class(), false);

    let wrappers: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| rt.wrappers().wrap(&obj, Transfer::Nothing)))
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });

    assert_eq!(wrappers.len(), 8);
    assert!(wrappers.iter().all(|w| Arc::ptr_eq(w, &wrappers[0])));
    assert_eq!(obj.ref_count(), 2);
    assert_eq!(rt.wrappers().len(), 1);
}

#[test]
fn test_concurrent_toggle_switch_happens_once() {
    let rt = runtime();
    let obj = NativeObject::new(rt.heap(), button_class(), false);
    let wrapper = rt.wrappers().wrap(&obj, Transfer::Nothing);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| wrapper.ensure_toggle_ref());
        }
    });

    assert!(obj.has_toggle_ref());
    assert_eq!(obj.ref_count(), 2);
    assert_eq!(wrapper.state(), OwnershipState::NativeOwned);
    assert!(rt.wrappers().is_pinned(obj.id()));
}

#[test]
fn test_returned_objects_follow_transfer() {
    let rt = runtime();
    let class = button_class();
    let kept: Arc<Mutex<Option<NativeObjectRef>>> = Arc::new(Mutex::new(None));

    let factory = {
        let new_class = Arc::clone(&class);
        CallableInfo::function(
            "Demo",
            "button_new",
            NativeFn::new(move |frame| {
                let obj = NativeObject::new(frame.heap(), Arc::clone(&new_class), false);
                frame.set_return(NativeValue::Object(Some(obj)));
                true
            }),
        )
        .returns(TypeInfo::object(Arc::clone(&class)), Transfer::Everything)
        .build()
    };
    let getter = {
        let default_class = Arc::clone(&class);
        let kept = Arc::clone(&kept);
        CallableInfo::function(
            "Demo",
            "get_default",
            NativeFn::new(move |frame| {
                let mut slot = kept.lock();
                let obj =
                    slot.get_or_insert_with(|| NativeObject::new(frame.heap(), Arc::clone(&default_class), false));
                frame.set_return(NativeValue::Object(Some(Arc::clone(obj))));
                true
            }),
        )
        .returns(TypeInfo::object(Arc::clone(&class)), Transfer::Nothing)
        .build()
    };

    let mut guard = rt.host_lock().acquire();

    let owned = gimarshal::invoke(&rt, &mut guard, &factory, &[], &[]).unwrap();
    let native = owned.as_object().map(|w| Arc::clone(w.native())).unwrap();
    assert_eq!(native.ref_count(), 1);
    drop(owned);
    assert!(native.is_finalized());

    let borrowed = gimarshal::invoke(&rt, &mut guard, &getter, &[], &[]).unwrap();
    let native = kept.lock().clone().unwrap();
    assert_eq!(native.ref_count(), 2);
    drop(borrowed);
    assert_eq!(native.ref_count(), 1);
    assert!(!native.is_finalized());
}

#[test]
fn test_out_struct_transfer_duplication() {
    let rt = runtime();
    let info = StructInfo::new("Demo", "Counter", StructKind::Boxed);
    rt.types().register_boxed(&info, BoxedVTable::refcounted());
    let kept: Arc<Mutex<Option<NativeBoxed>>> = Arc::new(Mutex::new(None));

    let make = |name: &str, transfer: Transfer| {
        let kept = Arc::clone(&kept);
        CallableInfo::function(
            "Demo",
            name,
            NativeFn::new(move |frame| {
                let mut slot = kept.lock();
                let boxed =
                    slot.get_or_insert_with(|| BoxedInstance::new(frame.heap(), "Demo.Counter", BoxedVTable::refcounted()));
                if transfer == Transfer::Everything {
                    boxed.acquire();
                }
                frame.set_return(NativeValue::Boxed(Some(Arc::clone(boxed))));
                true
            }),
        )
        .returns(TypeInfo::boxed(Arc::clone(&info)), transfer)
        .build()
    };
    let dup = make("counter_dup", Transfer::Everything);
    let peek = make("counter_peek", Transfer::Nothing);

    let mut guard = rt.host_lock().acquire();

    // The host wrapper owns its own reference
    let owned = gimarshal::invoke(&rt, &mut guard, &dup, &[], &[]).unwrap();
    let native = kept.lock().clone().unwrap();
    assert_eq!(native.ref_count(), 2);
    drop(owned);
    assert_eq!(native.ref_count(), 1);
    assert!(native.alloc().is_live());

    // A borrowed wrapper never frees the native value
    let borrowed = gimarshal::invoke(&rt, &mut guard, &peek, &[], &[]).unwrap();
    assert!(!borrowed.as_boxed().unwrap().owns());
    drop(borrowed);
    assert_eq!(native.ref_count(), 1);
    assert!(native.alloc().is_live());
    assert_eq!(rt.heap().stats().double_frees, 0);
}

#[test]
fn test_closures_invalidated_with_their_wrapper() {
    let rt = runtime();
    let class = button_class();
    let handler = CallableInfo::callback("Demo", "ClickHandler")
        .arg(ArgInfo::new("clicks", TypeInfo::int32()))
        .arg(ArgInfo::new("data", TypeInfo::pointer()).closure(1))
        .build();

    type Installed = (NativeClosure, DestroyNotify, NativeValue);
    let installed: Arc<Mutex<Option<Installed>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&installed);
    let connect = CallableInfo::function(
        "Demo",
        "button_connect",
        NativeFn::new(move |frame| {
            let (NativeValue::Callback(Some(closure)), NativeValue::DestroyNotify(Some(notify))) =
                (frame.arg(1), frame.arg(3))
            else {
                return false;
            };
            *slot.lock() = Some((Arc::clone(closure), notify.clone(), frame.arg(2).clone()));
            true
        }),
    )
    .method_of(TypeInfo::object(Arc::clone(&class)))
    .arg(
        ArgInfo::new("handler", TypeInfo::callback(handler))
            .scope(ScopeType::Notified)
            .closure(1)
            .destroy(2),
    )
    .arg(ArgInfo::new("user_data", TypeInfo::pointer()))
    .arg(ArgInfo::new("notify", TypeInfo::pointer()))
    .build();

    let clicks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&clicks);
    let on_click = HostCallable::new(move |_, args| {
        sink.lock().push(args.to_vec());
        Ok(HostValue::None)
    });

    let obj = NativeObject::new(rt.heap(), Arc::clone(&class), false);
    let wrapper = rt.wrappers().wrap(&obj, Transfer::Nothing);
    {
        let mut guard = rt.host_lock().acquire();
        let args = [HostValue::Object(Arc::clone(&wrapper)), HostValue::Callable(on_click), HostValue::str("ok")];
        gimarshal::invoke(&rt, &mut guard, &connect, &args, &[]).unwrap();
    }
    assert_eq!(wrapper.closure_count(), 1);

    let (closure, notify, data) = installed.lock().take().unwrap();
    let fire = |closure: &NativeClosure| {
        let mut args = vec![NativeValue::Int32(1), data.clone()];
        let mut ret = NativeValue::Void;
        let mut error = None;
        let ok = closure.invoke(&mut NativeFrame::new(&mut args, &mut ret, &mut error, rt.heap()));
        (ok, error)
    };

    let (ok, error) = fire(&closure);
    assert!(ok);
    assert!(error.is_none());
    assert_eq!(clicks.lock()[0], vec![HostValue::Int(1), HostValue::str("ok")]);

    // The wrapper goes away; the native side still holds the closure
    drop(wrapper);
    let (ok, error) = fire(&closure);
    assert!(!ok);
    assert!(error.is_some());
    assert_eq!(clicks.lock().len(), 1);

    notify.notify(&data);
    assert!(closure.is_released());
    assert_eq!(rt.heap().live_of(AllocKind::Closure), 0);
}

#[test]
fn test_weak_wrapper_reports_finalization() {
    let rt = runtime();
    let obj = NativeObject::new(rt.heap(), button_class(), false);
    let wrapper = rt.wrappers().wrap(&obj, Transfer::Nothing);
    let weak = wrapper.downgrade();

    let upgraded = weak.upgrade().unwrap();
    assert!(Arc::ptr_eq(&upgraded, &wrapper));
    drop(upgraded);
    drop(wrapper);

    // Still alive through the native reference; a new wrapper is made on demand
    assert!(weak.is_alive());
    let rewrapped = weak.upgrade().unwrap();
    drop(rewrapped);

    obj.release();
    assert!(obj.is_finalized());
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
}
