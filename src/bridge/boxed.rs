//! Host wrappers for boxed (structured) native values

use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::introspection::StructInfo;
use crate::native::NativeBoxed;

/// Host view of one boxed instance.
///
/// `owns` decides whether dropping the wrapper frees the native value; a
/// non-owning wrapper only aliases memory somebody else releases.
pub struct HostBoxed {
    info: Arc<StructInfo>,
    native: NativeBoxed,
    owns: bool,
}

impl HostBoxed {
    pub fn new(info: &Arc<StructInfo>, native: NativeBoxed, owns: bool) -> Arc<Self> {
        trace!(event = "boxed_wrap", type_name = %info.full_name(), owns);
        Arc::new(Self {
            info: Arc::clone(info),
            native,
            owns,
        })
    }

    pub fn info(&self) -> &Arc<StructInfo> {
        &self.info
    }

    pub fn native(&self) -> &NativeBoxed {
        &self.native
    }

    pub fn type_name(&self) -> String {
        self.info.full_name()
    }

    pub fn owns(&self) -> bool {
        self.owns
    }

    /// Independent owning copy made through the type's vtable
    pub fn copy(&self) -> Arc<Self> {
        Self::new(&self.info, self.native.copy(), true)
    }
}

impl fmt::Debug for HostBoxed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBoxed")
            .field("type", &self.type_name())
            .field("native", &self.native)
            .field("owns", &self.owns)
            .finish()
    }
}

impl Drop for HostBoxed {
    fn drop(&mut self) {
        if self.owns {
            trace!(event = "boxed_wrapper_free", type_name = %self.info.full_name());
            self.native.free();
        }
    }
}
