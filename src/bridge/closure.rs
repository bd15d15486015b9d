//! Native-callable closures wrapping host callables
//!
//! Design: a `ClosureCell` is the trampoline native code holds for a host
//! callback. It carries the callback's signature cache, the host callable and
//! any spread user data. Native arguments are marshaled to host values, the
//! host result is marshaled back into the frame's out-slots using the same
//! single/multiple output framing as invocations.
//!
//! Lifetime follows the callback scope: `Call` closures are released by the
//! invocation that created them, `Async` ones after their first invocation,
//! `Notified` ones by the destroy-notify companion, `Forever` ones never.
//! The closure points back at the wrapper that installed it weakly; the
//! wrapper invalidates its closures when it is torn down.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

use super::runtime::Runtime;
use super::wrapper::HostObject;
use crate::cache::CallableCache;
use crate::errors::{MarshalError, Result};
use crate::host::{HostCallable, HostGuard, HostValue};
use crate::introspection::ScopeType;
use crate::marshal::{self, InContext, OutContext, Owned};
use crate::native::{
    AllocKind, Allocation, DestroyNotify, NativeCallback, NativeError, NativeFrame, NativeValue,
};

pub struct ClosureCell {
    runtime: Weak<Runtime>,
    cache: Arc<CallableCache>,
    callable: HostCallable,
    user_data: Option<Vec<HostValue>>,
    scope: ScopeType,
    alloc: Allocation,
    released: AtomicBool,
    invalidated: AtomicBool,
    owner: Mutex<Option<Weak<HostObject>>>,
    /// Results native code only borrows; freed when the closure is released
    keep_alive: Mutex<Vec<Owned>>,
}

impl ClosureCell {
    pub fn new(
        runtime: &Arc<Runtime>,
        cache: Arc<CallableCache>,
        callable: HostCallable,
        user_data: Option<Vec<HostValue>>,
        scope: ScopeType,
    ) -> Arc<Self> {
        let alloc = runtime.heap().alloc(AllocKind::Closure);
        debug!(event = "closure_new", callback = %cache.name, scope = ?scope, id = alloc.id());
        Arc::new(Self {
            runtime: Arc::downgrade(runtime),
            cache,
            callable,
            user_data,
            scope,
            alloc,
            released: AtomicBool::new(false),
            invalidated: AtomicBool::new(false),
            owner: Mutex::new(None),
            keep_alive: Mutex::new(Vec::new()),
        })
    }

    pub fn scope(&self) -> ScopeType {
        self.scope
    }

    pub fn cache(&self) -> &Arc<CallableCache> {
        &self.cache
    }

    /// Opaque user-data pointer handed to native code next to the closure
    pub fn user_data_pointer(&self) -> NativeValue {
        NativeValue::Pointer(self.alloc.id() as usize)
    }

    /// Destroy notify that releases this closure
    pub fn destroy_notify(self: &Arc<Self>) -> DestroyNotify {
        let closure = Arc::clone(self);
        DestroyNotify::new(move |_| {
            trace!(event = "destroy_notify", id = closure.alloc.id());
            closure.release();
        })
    }

    pub(crate) fn set_owner(&self, owner: Weak<HostObject>) {
        *self.owner.lock() = Some(owner);
    }

    pub fn owner(&self) -> Option<Arc<HostObject>> {
        self.owner.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Owner wrapper went away; later invocations fail
    pub fn invalidate(&self) {
        if !self.invalidated.swap(true, Ordering::AcqRel) {
            debug!(event = "closure_invalidated", id = self.alloc.id());
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    fn dispatch(&self, runtime: &Arc<Runtime>, guard: &mut HostGuard<'_>, frame: &mut NativeFrame<'_>) -> Result<()> {
        let cache = &*self.cache;
        let mut host_args = Vec::with_capacity(cache.args.len());
        {
            let ctx = OutContext {
                runtime,
                callable: Some(cache),
                native_args: &*frame.args,
            };
            for (index, arg) in cache.args.iter().enumerate() {
                if !arg.direction.is_from_host() || arg.is_child() || arg.is_closure() {
                    continue;
                }
                let value = frame.arg(index).clone();
                host_args.push(marshal::to_host(&ctx, arg, value)?);
            }
        }
        if let Some(user_data) = &self.user_data {
            host_args.extend(user_data.iter().cloned());
        }

        let result = self.callable.call(guard, &host_args)?;
        self.store_results(runtime, frame, result)
    }

    /// Write the host result into the return slot and out-arguments
    fn store_results(&self, runtime: &Arc<Runtime>, frame: &mut NativeFrame<'_>, result: HostValue) -> Result<()> {
        let cache = &*self.cache;
        let n_outputs = cache.n_outputs();
        let values = match n_outputs {
            0 => return Ok(()),
            1 => vec![result],
            n => match &result {
                HostValue::Tuple(items) | HostValue::List(items) if items.len() == n => items.to_vec(),
                _ => {
                    return Err(MarshalError::type_error(format!(
                        "{}() must return a tuple of {} values, not {}",
                        cache.name,
                        n,
                        result.type_name()
                    )))
                }
            },
        };

        let ctx = InContext {
            runtime,
            callable: Some(cache),
            host_args: &[],
            owner: None,
        };
        let mut targets = Vec::with_capacity(n_outputs);
        if cache.has_return() {
            targets.push((None, &cache.return_cache));
        }
        targets.extend(cache.to_host_args.iter().map(|&i| (Some(i), &cache.args[i])));

        for ((slot, arg), value) in targets.into_iter().zip(values.iter()) {
            let marshaled = marshal::from_host(&ctx, arg, value)?;
            match slot {
                Some(index) => frame.set_out(index, marshaled.value),
                None => frame.set_return(marshaled.value),
            }
            for (child, value) in marshaled.children {
                frame.set_out(child, value);
            }
            self.keep_alive.lock().extend(marshaled.cleanup.into_retained());
        }
        Ok(())
    }
}

impl NativeCallback for ClosureCell {
    fn invoke(&self, frame: &mut NativeFrame<'_>) -> bool {
        if self.is_released() || self.is_invalidated() {
            error!(event = "closure_invoked_after_release", callback = %self.cache.name, id = self.alloc.id());
            frame.set_error(
                NativeError::BINDING_DOMAIN,
                NativeError::CODE_HOST_FAILURE,
                format!("{}: closure is no longer valid", self.cache.name),
            );
            return false;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            error!(event = "closure_runtime_gone", callback = %self.cache.name);
            return false;
        };

        trace!(event = "closure_invoke", callback = %self.cache.name, id = self.alloc.id());
        let outcome = {
            let mut guard = runtime.host_lock().acquire();
            self.dispatch(&runtime, &mut guard, frame)
        };

        let ok = match outcome {
            Ok(()) => true,
            Err(err) => {
                if self.cache.throws {
                    *frame.error = Some(err.to_native_error());
                } else {
                    warn!(event = "callback_exception", callback = %self.cache.name, error = %err);
                }
                false
            }
        };

        if self.scope == ScopeType::Async {
            self.release();
        }
        ok
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            error!(event = "closure_double_release", callback = %self.cache.name, id = self.alloc.id());
            return;
        }
        debug!(event = "closure_release", callback = %self.cache.name, id = self.alloc.id());
        self.alloc.free();
        let kept = std::mem::take(&mut *self.keep_alive.lock());
        for owned in kept {
            owned.release();
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn allocation(&self) -> &Allocation {
        &self.alloc
    }
}

impl fmt::Debug for ClosureCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureCell")
            .field("callback", &self.cache.name)
            .field("scope", &self.scope)
            .field("alloc", &self.alloc)
            .field("released", &self.is_released())
            .finish()
    }
}
