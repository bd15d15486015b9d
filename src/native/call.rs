//! Native call shape shared by functions, vfuncs and callback trampolines

use std::fmt;
use std::sync::Arc;

use super::error::NativeError;
use super::heap::{Allocation, NativeHeap};
use super::value::NativeValue;

/// One native call's argument, return and error slots
pub struct NativeFrame<'a> {
    pub args: &'a mut [NativeValue],
    pub ret: &'a mut NativeValue,
    pub error: &'a mut Option<NativeError>,
    pub heap: &'a Arc<NativeHeap>,
}

impl<'a> NativeFrame<'a> {
    pub fn new(
        args: &'a mut [NativeValue],
        ret: &'a mut NativeValue,
        error: &'a mut Option<NativeError>,
        heap: &'a Arc<NativeHeap>,
    ) -> Self {
        Self { args, ret, error, heap }
    }

    pub fn arg(&self, index: usize) -> &NativeValue {
        static VOID: NativeValue = NativeValue::Void;
        self.args.get(index).unwrap_or(&VOID)
    }

    /// Write an out-parameter; out of range writes are ignored
    pub fn set_out(&mut self, index: usize, value: NativeValue) {
        if let Some(slot) = self.args.get_mut(index) {
            *slot = value;
        }
    }

    pub fn set_return(&mut self, value: NativeValue) {
        *self.ret = value;
    }

    /// Report a recoverable failure through the error slot
    pub fn set_error(&mut self, domain: &str, code: i32, message: impl Into<String>) {
        *self.error = Some(NativeError::new(domain, code, message));
    }

    pub fn heap(&self) -> &Arc<NativeHeap> {
        self.heap
    }
}

/// Native function by address: fills out-slots, returns success
#[derive(Clone)]
pub struct NativeFn(Arc<dyn Fn(&mut NativeFrame<'_>) -> bool + Send + Sync>);

impl NativeFn {
    pub fn new(f: impl Fn(&mut NativeFrame<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, frame: &mut NativeFrame<'_>) -> bool {
        (self.0)(frame)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// A callable native code can hold and invoke later (a closure trampoline)
pub trait NativeCallback: Send + Sync + fmt::Debug {
    fn invoke(&self, frame: &mut NativeFrame<'_>) -> bool;

    /// Release the closure; later invocations fail
    fn release(&self);

    fn is_released(&self) -> bool;

    fn allocation(&self) -> &Allocation;
}

pub type NativeClosure = Arc<dyn NativeCallback>;

/// Destroy-notify handed to native code alongside user data
#[derive(Clone)]
pub struct DestroyNotify(Arc<dyn Fn(&NativeValue) + Send + Sync>);

impl DestroyNotify {
    pub fn new(f: impl Fn(&NativeValue) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn notify(&self, user_data: &NativeValue) {
        (self.0)(user_data)
    }
}

impl fmt::Debug for DestroyNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DestroyNotify")
    }
}
