use super::*;
use crate::config::RuntimeConfig;
use crate::errors::ErrorKind;
use crate::host::{HostCallable, HostValue};
use crate::introspection::{ArgInfo, CallableInfo, ObjectInfo, ScopeType, StructInfo, StructKind, Transfer, TypeInfo};
use crate::native::{
    AllocKind, BoxedInstance, BoxedVTable, NativeCallback, NativeError, NativeFrame, NativeHeap, NativeObject,
    NativeValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn runtime() -> Arc<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

fn class() -> Arc<ObjectInfo> {
    Arc::new(ObjectInfo::new("Test", "Widget", None))
}

fn int_callback(rt: &Arc<Runtime>) -> Arc<crate::cache::CallableCache> {
    let info = CallableInfo::callback("Test", "IntFunc")
        .arg(ArgInfo::new("value", TypeInfo::int32()))
        .returns(TypeInfo::int32(), Transfer::Nothing)
        .build();
    rt.cache_for(&info).unwrap()
}

fn add_one() -> HostCallable {
    HostCallable::new(|_, args| match args.first() {
        Some(HostValue::Int(v)) => Ok(HostValue::Int(v + 1)),
        other => panic!("unexpected args {:?}", other),
    })
}

fn call_closure(closure: &ClosureCell, heap: &Arc<NativeHeap>, value: i32) -> (bool, NativeValue, Option<NativeError>) {
    let mut args = vec![NativeValue::Int32(value)];
    let mut ret = NativeValue::Int32(0);
    let mut error = None;
    let ok = {
        let mut frame = NativeFrame::new(&mut args, &mut ret, &mut error, heap);
        closure.invoke(&mut frame)
    };
    (ok, ret, error)
}

#[test]
fn test_wrap_returns_same_wrapper() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), false);

    let first = table.wrap(&obj, Transfer::Nothing);
    let second = table.wrap(&obj, Transfer::Nothing);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(obj.ref_count(), 2);
    assert_eq!(table.len(), 1);

    drop(first);
    drop(second);
    assert_eq!(obj.ref_count(), 1);
    assert!(table.is_empty());
    assert!(table.lookup(obj.id()).is_none());
}

#[test]
fn test_wrap_adopts_floating_reference() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), true);

    let wrapper = table.wrap(&obj, Transfer::Everything);
    assert!(!obj.is_floating());
    assert_eq!(obj.ref_count(), 1);

    drop(wrapper);
    assert!(obj.is_finalized());
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn test_wrap_existing_releases_transferred_reference() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), false);
    let wrapper = table.wrap(&obj, Transfer::Nothing);
    assert_eq!(obj.ref_count(), 2);

    // A second transfer-full return of the same object
    obj.acquire();
    let again = table.wrap(&obj, Transfer::Everything);
    assert!(Arc::ptr_eq(&wrapper, &again));
    assert_eq!(obj.ref_count(), 2);
}

#[test]
fn test_toggle_ref_keeps_wrapper_alive_while_native_holds_it() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), false);
    let id = obj.id();

    let wrapper = table.wrap(&obj, Transfer::Nothing);
    assert_eq!(wrapper.state(), OwnershipState::HostOwned);

    wrapper.set_attr("label", HostValue::str("kept"));
    assert_eq!(wrapper.state(), OwnershipState::NativeOwned);
    assert!(obj.has_toggle_ref());
    assert!(table.is_pinned(id));

    // Host drops its handle; native still references the object
    drop(wrapper);
    let found = table.lookup(id).expect("pinned wrapper");
    assert_eq!(found.get_attr("label"), Some(HostValue::str("kept")));

    // Native drops its reference: only the toggle reference remains
    obj.release();
    assert_eq!(found.state(), OwnershipState::SharedToggle);
    assert!(!table.is_pinned(id));
    assert!(!obj.is_finalized());

    drop(found);
    assert!(obj.is_finalized());
    assert!(table.is_empty());
    assert_eq!(heap.live_count(), 0);
}

#[test]
fn test_toggle_ref_installed_once() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), true);
    let wrapper = table.wrap(&obj, Transfer::Everything);

    wrapper.set_attr("a", HostValue::Int(1));
    let count = obj.ref_count();
    wrapper.set_attr("b", HostValue::Int(2));
    wrapper.ensure_toggle_ref();
    assert_eq!(obj.ref_count(), count);
    assert_eq!(wrapper.state(), OwnershipState::SharedToggle);

    drop(wrapper);
    assert!(obj.is_finalized());
}

#[test]
fn test_weak_wrapper_upgrade() {
    let heap = NativeHeap::new();
    let table = WrapperTable::new();
    let obj = NativeObject::new(&heap, class(), false);

    let wrapper = table.wrap(&obj, Transfer::Nothing);
    let weak = wrapper.downgrade();
    assert!(weak.is_alive());
    assert_eq!(weak.id(), obj.id());

    drop(wrapper);
    let revived = weak.upgrade().expect("object still alive");
    assert_eq!(revived.id(), obj.id());
    drop(revived);

    obj.release();
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_boxed_wrapper_ownership() {
    let heap = NativeHeap::new();
    let info = StructInfo::new("Test", "Rect", StructKind::Boxed);

    let owned = BoxedInstance::new(&heap, "Test.Rect", BoxedVTable::plain());
    let borrowed = BoxedInstance::new(&heap, "Test.Rect", BoxedVTable::plain());
    borrowed.set("width", NativeValue::Int32(3));

    let owning = HostBoxed::new(&info, Arc::clone(&owned), true);
    let aliasing = HostBoxed::new(&info, Arc::clone(&borrowed), false);
    let copy = aliasing.copy();
    assert!(copy.owns());
    assert_ne!(copy.native().alloc(), borrowed.alloc());
    assert_eq!(copy.native().get("width").and_then(|v| v.as_i128()), Some(3));
    assert_eq!(heap.live_of(AllocKind::Boxed), 3);

    drop(owning);
    drop(aliasing);
    drop(copy);
    assert!(!owned.alloc().is_live());
    assert!(borrowed.alloc().is_live());
    assert_eq!(heap.live_of(AllocKind::Boxed), 1);
}

#[test]
fn test_closure_invoke_marshals_both_ways() {
    let rt = runtime();
    let closure = ClosureCell::new(&rt, int_callback(&rt), add_one(), None, ScopeType::Forever);

    let (ok, ret, error) = call_closure(&closure, rt.heap(), 41);
    assert!(ok);
    assert!(error.is_none());
    assert_eq!(ret.as_i128(), Some(42));
    assert!(!closure.is_released());
}

#[test]
fn test_closure_appends_user_data() {
    let rt = runtime();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let callable = HostCallable::new(move |_, args| {
        counter.store(args.len(), Ordering::SeqCst);
        Ok(args[1].clone())
    });
    let user_data = vec![HostValue::Int(7), HostValue::str("extra")];
    let closure = ClosureCell::new(&rt, int_callback(&rt), callable, Some(user_data), ScopeType::Call);

    let (ok, ret, _) = call_closure(&closure, rt.heap(), 1);
    assert!(ok);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(ret.as_i128(), Some(7));
}

#[test]
fn test_async_closure_released_after_first_call() {
    let rt = runtime();
    let closure = ClosureCell::new(&rt, int_callback(&rt), add_one(), None, ScopeType::Async);
    assert_eq!(rt.heap().live_of(AllocKind::Closure), 1);

    let (ok, _, _) = call_closure(&closure, rt.heap(), 1);
    assert!(ok);
    assert!(closure.is_released());
    assert_eq!(rt.heap().live_of(AllocKind::Closure), 0);

    let (ok, _, error) = call_closure(&closure, rt.heap(), 1);
    assert!(!ok);
    assert_eq!(error.map(|e| e.domain), Some(NativeError::BINDING_DOMAIN.to_string()));
}

#[test]
fn test_destroy_notify_releases_once() {
    let rt = runtime();
    let closure = ClosureCell::new(&rt, int_callback(&rt), add_one(), None, ScopeType::Notified);
    let notify = closure.destroy_notify();

    notify.notify(&closure.user_data_pointer());
    assert!(closure.is_released());
    notify.notify(&closure.user_data_pointer());
    assert_eq!(rt.heap().stats().double_frees, 0);
    assert_eq!(rt.heap().live_of(AllocKind::Closure), 0);
}

#[test]
fn test_closure_invalidated_with_owner() {
    let rt = runtime();
    let obj = NativeObject::new(rt.heap(), class(), false);
    let wrapper = rt.wrappers().wrap(&obj, Transfer::Nothing);
    let closure = ClosureCell::new(&rt, int_callback(&rt), add_one(), None, ScopeType::Notified);

    wrapper.track_closure(&closure);
    assert_eq!(wrapper.closure_count(), 1);
    assert!(closure.owner().is_some());

    drop(wrapper);
    assert!(closure.is_invalidated());
    let (ok, _, error) = call_closure(&closure, rt.heap(), 1);
    assert!(!ok);
    assert!(error.is_some());
    closure.release();
}

#[test]
fn test_throwing_callback_reports_error() {
    let rt = runtime();
    let info = CallableInfo::callback("Test", "Checked")
        .arg(ArgInfo::new("value", TypeInfo::int32()))
        .returns(TypeInfo::int32(), Transfer::Nothing)
        .throws()
        .build();
    let failing = HostCallable::new(|_, _| Ok(HostValue::str("not a number")));
    let closure = ClosureCell::new(&rt, rt.cache_for(&info).unwrap(), failing, None, ScopeType::Forever);

    let (ok, _, error) = call_closure(&closure, rt.heap(), 1);
    assert!(!ok);
    let error = error.expect("error slot set");
    assert!(error.message.contains("Must be number, not str"), "{}", error.message);
}

#[test]
fn test_callback_result_framing() {
    let rt = runtime();
    let info = CallableInfo::callback("Test", "Pair")
        .arg(ArgInfo::new("out", TypeInfo::int32()).out())
        .returns(TypeInfo::int32(), Transfer::Nothing)
        .throws()
        .build();
    let cache = rt.cache_for(&info).unwrap();

    let good = ClosureCell::new(
        &rt,
        Arc::clone(&cache),
        HostCallable::new(|_, _| Ok(HostValue::tuple(vec![HostValue::Int(1), HostValue::Int(2)]))),
        None,
        ScopeType::Forever,
    );
    let mut args = vec![NativeValue::Int32(0)];
    let mut ret = NativeValue::Int32(0);
    let mut error = None;
    let ok = good.invoke(&mut NativeFrame::new(&mut args, &mut ret, &mut error, rt.heap()));
    assert!(ok);
    assert_eq!(ret.as_i128(), Some(1));
    assert_eq!(args[0].as_i128(), Some(2));

    let bad = ClosureCell::new(
        &rt,
        cache,
        HostCallable::new(|_, _| Ok(HostValue::Int(1))),
        None,
        ScopeType::Forever,
    );
    let ok = bad.invoke(&mut NativeFrame::new(&mut args, &mut ret, &mut error, rt.heap()));
    assert!(!ok);
    let message = error.map(|e| e.message).unwrap_or_default();
    assert!(message.contains("must return a tuple of 2 values, not int"), "{}", message);
}

#[test]
fn test_subclass_override_registered_as_vfunc() {
    let rt = runtime();
    let base = class();
    let signature = CallableInfo::vfunc(Arc::clone(&base), "measure")
        .arg(ArgInfo::new("hint", TypeInfo::int32()))
        .returns(TypeInfo::int32(), Transfer::Nothing)
        .build();
    let parent = Arc::new(ObjectInfo::new("Test", "Widget", None).with_vfunc(signature));

    let derived = rt
        .types()
        .register_subclass(&rt, &parent, "Label", vec![("measure", add_one_after_self())])
        .unwrap();
    assert!(derived.is_a(&parent));
    assert!(rt.types().lookup_vfunc(&derived, "measure").is_some());
    assert!(rt.types().lookup_vfunc(&parent, "measure").is_none());

    let err = rt
        .types()
        .register_subclass(&rt, &parent, "Broken", vec![("resize", add_one())])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(err.to_string().contains("has no virtual function 'resize'"));
}

fn add_one_after_self() -> HostCallable {
    HostCallable::new(|_, args| match args {
        [HostValue::Object(_), HostValue::Int(v)] => Ok(HostValue::Int(v + 1)),
        other => panic!("unexpected args {:?}", other),
    })
}

#[test]
fn test_runtime_stats_start_empty() {
    let rt = runtime();
    let stats = rt.stats();
    assert_eq!(stats, InvokeStats::default());
    int_callback(&rt);
    int_callback(&rt);
    // Distinct metadata each time, so both are misses
    assert_eq!(rt.stats().cache_misses, 2);
}
