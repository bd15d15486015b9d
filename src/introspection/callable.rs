//! Callable signatures: functions, methods, virtual functions and callbacks

use std::sync::Arc;

use super::registered::ObjectInfo;
use super::types::{Direction, ScopeType, Transfer, TypeInfo};
use crate::native::{NativeFn, NativeValue};

#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub name: String,
    pub type_info: TypeInfo,
    pub direction: Direction,
    pub transfer: Transfer,
    /// `None`/null accepted
    pub nullable: bool,
    /// May be omitted at the call site
    pub optional: bool,
    pub caller_allocates: bool,
    /// On a callback argument: index of its user-data argument
    pub closure: Option<usize>,
    /// On a callback argument: index of its destroy-notify argument
    pub destroy: Option<usize>,
    pub scope: ScopeType,
    /// Native value used when the argument is omitted
    pub default: Option<NativeValue>,
}

impl ArgInfo {
    pub fn new(name: &str, type_info: TypeInfo) -> Self {
        Self {
            name: name.to_string(),
            type_info,
            direction: Direction::In,
            transfer: Transfer::Nothing,
            nullable: false,
            optional: false,
            caller_allocates: false,
            closure: None,
            destroy: None,
            scope: ScopeType::Call,
            default: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn out(self) -> Self {
        self.direction(Direction::Out)
    }

    pub fn inout(self) -> Self {
        self.direction(Direction::InOut)
    }

    pub fn transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn caller_allocates(mut self) -> Self {
        self.caller_allocates = true;
        self
    }

    pub fn closure(mut self, index: usize) -> Self {
        self.closure = Some(index);
        self
    }

    pub fn destroy(mut self, index: usize) -> Self {
        self.destroy = Some(index);
        self
    }

    pub fn scope(mut self, scope: ScopeType) -> Self {
        self.scope = scope;
        self
    }

    /// Explicit native default; implies `optional`
    pub fn with_default(mut self, value: NativeValue) -> Self {
        self.default = Some(value);
        self.optional = true;
        self
    }
}

/// How a callable reaches native code
#[derive(Debug, Clone)]
pub enum CallableKind {
    /// Plain function by address
    Function(NativeFn),
    /// Virtual dispatch on the implementor of `container`
    VFunc { container: Arc<ObjectInfo> },
    /// Signature of a callback; invoked through a pre-resolved pointer
    Callback,
}

#[derive(Debug, Clone)]
pub struct CallableInfo {
    pub namespace: String,
    pub name: String,
    pub kind: CallableKind,
    pub args: Vec<ArgInfo>,
    pub return_type: TypeInfo,
    pub return_transfer: Transfer,
    pub may_return_null: bool,
    /// Return value carries no information and is hidden from the host
    pub skip_return: bool,
    /// Reports failures through the native error slot
    pub throws: bool,
    /// Receiver type for methods; becomes an implicit first argument
    pub instance: Option<TypeInfo>,
}

impl CallableInfo {
    pub fn function(namespace: &str, name: &str, func: NativeFn) -> Self {
        Self::with_kind(namespace, name, CallableKind::Function(func))
    }

    pub fn callback(namespace: &str, name: &str) -> Self {
        Self::with_kind(namespace, name, CallableKind::Callback)
    }

    pub fn vfunc(container: Arc<ObjectInfo>, name: &str) -> Self {
        let namespace = container.namespace.clone();
        let instance = TypeInfo::object(Arc::clone(&container));
        let mut info = Self::with_kind(&namespace, name, CallableKind::VFunc { container });
        info.instance = Some(instance);
        info
    }

    fn with_kind(namespace: &str, name: &str, kind: CallableKind) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            args: Vec::new(),
            return_type: TypeInfo::void(),
            return_transfer: Transfer::Nothing,
            may_return_null: false,
            skip_return: false,
            throws: false,
            instance: None,
        }
    }

    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.args.push(arg);
        self
    }

    pub fn returns(mut self, type_info: TypeInfo, transfer: Transfer) -> Self {
        self.return_type = type_info;
        self.return_transfer = transfer;
        self
    }

    pub fn may_return_null(mut self) -> Self {
        self.may_return_null = true;
        self
    }

    pub fn skip_return(mut self) -> Self {
        self.skip_return = true;
        self
    }

    pub fn throws(mut self) -> Self {
        self.throws = true;
        self
    }

    /// Make this a method on `instance`
    pub fn method_of(mut self, instance: TypeInfo) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}
