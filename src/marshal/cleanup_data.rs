//! Cleanup tokens recorded while converting host values to native ones

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::bridge::ForeignMarshaler;
use crate::introspection::Transfer;
use crate::native::{Allocation, NativeBoxed, NativeClosure, NativeObjectRef, NativeValue};

/// One native resource the binding is answerable for
pub enum Owned {
    Memory(Allocation),
    Boxed(NativeBoxed),
    Object(NativeObjectRef),
    Closure(NativeClosure),
    Foreign {
        value: NativeValue,
        marshaler: Arc<ForeignMarshaler>,
    },
}

impl Owned {
    /// Release the resource. Never fails; anomalies are logged by the ledger.
    pub fn release(self) {
        match self {
            Self::Memory(alloc) => {
                trace!(event = "cleanup_memory", id = alloc.id());
                alloc.free();
            }
            Self::Boxed(boxed) => boxed.free(),
            Self::Object(obj) => obj.release(),
            Self::Closure(closure) => closure.release(),
            Self::Foreign { value, marshaler } => marshaler.release(&value),
        }
    }
}

impl fmt::Debug for Owned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(alloc) => write!(f, "Memory({:?})", alloc),
            Self::Boxed(boxed) => write!(f, "Boxed({})", boxed.type_name()),
            Self::Object(obj) => write!(f, "Object(#{})", obj.id()),
            Self::Closure(closure) => write!(f, "Closure({:?})", closure.allocation()),
            Self::Foreign { marshaler, .. } => write!(f, "Foreign({})", marshaler.full_name()),
        }
    }
}

/// Tokens needed to reverse one from-host conversion.
///
/// `retained` resources stay the binding's and are released after the call
/// whatever happens. `transferred` ones pass to the callee on success and are
/// released only when the invocation fails.
#[derive(Debug, Default)]
pub struct CleanupData {
    retained: SmallVec<[Owned; 2]>,
    transferred: SmallVec<[Owned; 2]>,
}

impl CleanupData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource according to the transfer rule that governs it
    pub fn own(&mut self, transfer: Transfer, owned: Owned) {
        match transfer {
            Transfer::Nothing => self.retained.push(owned),
            Transfer::Container | Transfer::Everything => self.transferred.push(owned),
        }
    }

    pub fn retain(&mut self, owned: Owned) {
        self.retained.push(owned);
    }

    pub fn transfer(&mut self, owned: Owned) {
        self.transferred.push(owned);
    }

    pub fn merge(&mut self, other: CleanupData) {
        self.retained.extend(other.retained);
        self.transferred.extend(other.transferred);
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty() && self.transferred.is_empty()
    }

    pub fn len(&self) -> usize {
        self.retained.len() + self.transferred.len()
    }

    /// Success path: free the binding's temporaries, hand the rest over
    pub fn finish(self) {
        for owned in self.retained {
            owned.release();
        }
    }

    /// Failure path: nothing reached the callee, release everything
    pub fn abort(self) {
        for owned in self.retained.into_iter().chain(self.transferred) {
            owned.release();
        }
    }

    /// Keep retained resources alive elsewhere (callback results)
    pub fn into_retained(self) -> SmallVec<[Owned; 2]> {
        self.retained
    }
}
