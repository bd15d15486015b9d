//! Callable cache construction
//!
//! Design: one pass assigns roles (length companions, closure data, destroy
//! notifies), a second builds each argument's sum-typed kind, and a final
//! backwards pass decides which host-visible arguments may be omitted.
//! Construction is a pure function of the signature and the foreign registry.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::arg::{
    ArgCache, ArgKind, ArrayCache, CallbackCache, FloatWidth, HashCache, IntWidth, ListCache,
    MetaRole, StructCache,
};
use crate::bridge::ForeignRegistry;
use crate::errors::{MarshalError, Result};
use crate::introspection::{
    ArgInfo, ArrayType, CallableInfo, CallableKind, Direction, InterfaceInfo, ObjectInfo, TypeInfo,
    TypeTag,
};
use crate::native::NativeFn;

/// Calling convention, selected once per cache
#[derive(Debug, Clone)]
pub enum InvokerKind {
    Function(NativeFn),
    VFunc { container: Arc<ObjectInfo>, name: String },
    Callback,
}

#[derive(Debug, Clone)]
pub struct CallableCache {
    pub name: String,
    pub args: Vec<ArgCache>,
    pub return_cache: ArgCache,
    pub n_from_host_args: usize,
    pub n_to_host_args: usize,
    /// Host-visible parameter names in position order
    pub arg_name_list: Vec<String>,
    pub arg_name_index: HashMap<String, usize>,
    /// Host position -> native position
    pub host_to_native: Vec<usize>,
    pub user_data_varargs_index: Option<usize>,
    /// Native positions of host-visible outputs, declaration order
    pub to_host_args: Vec<usize>,
    pub invoker: InvokerKind,
    /// Argument 0 is the implicit method receiver
    pub has_instance: bool,
    pub throws: bool,
    pub skip_return: bool,
}

impl CallableCache {
    /// Build the cache for `info`. Fails fast on the first unsupported type.
    pub fn build(info: &CallableInfo, foreign: &ForeignRegistry) -> Result<Self> {
        let name = info.full_name();
        let args = effective_args(info);
        let offset = args.len() - info.args.len();
        let roles = assign_roles(info, &args, offset)?;

        let mut caches = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let mut cache = build_arg(&name, arg, roles[index], &args, offset, foreign)?;
            cache.native_arg_index = Some(index);
            caches.push(cache);
        }

        let mut arg_name_list = Vec::new();
        let mut arg_name_index = HashMap::new();
        let mut host_to_native = Vec::new();
        for (index, cache) in caches.iter_mut().enumerate() {
            let visible = !cache.is_child() && (cache.direction.is_from_host() || cache.is_closure());
            if visible {
                let host_index = arg_name_list.len();
                cache.host_arg_index = Some(host_index);
                arg_name_index.insert(cache.name.clone(), host_index);
                arg_name_list.push(cache.name.clone());
                host_to_native.push(index);
            }
        }

        assign_defaults(&mut caches, &host_to_native);

        let user_data_varargs_index = host_to_native
            .last()
            .filter(|&&c| caches[c].is_closure())
            .and_then(|&c| caches[c].host_arg_index);

        let to_host_args = caches
            .iter()
            .enumerate()
            .filter(|(_, c)| c.direction.is_to_host() && !c.is_child())
            .map(|(i, _)| i)
            .collect();

        let mut return_cache = build_arg(
            &name,
            &ArgInfo::new("return", info.return_type.clone()).out().transfer(info.return_transfer),
            MetaRole::None,
            &args,
            offset,
            foreign,
        )?;
        return_cache.allow_none = info.may_return_null;

        let invoker = match &info.kind {
            CallableKind::Function(f) => InvokerKind::Function(f.clone()),
            CallableKind::VFunc { container } => InvokerKind::VFunc {
                container: Arc::clone(container),
                name: info.name.clone(),
            },
            CallableKind::Callback => InvokerKind::Callback,
        };

        let cache = Self {
            n_from_host_args: caches.iter().filter(|c| c.direction.is_from_host()).count(),
            n_to_host_args: caches.iter().filter(|c| c.direction.is_to_host()).count(),
            name,
            args: caches,
            return_cache,
            arg_name_list,
            arg_name_index,
            host_to_native,
            user_data_varargs_index,
            to_host_args,
            invoker,
            has_instance: info.instance.is_some(),
            throws: info.throws,
            skip_return: info.skip_return,
        };

        debug!(
            event = "cache_built",
            callable = %cache.name,
            args = cache.args.len(),
            host_args = cache.n_host_args(),
            outputs = cache.n_outputs(),
        );
        Ok(cache)
    }

    /// Number of host-visible parameters
    pub fn n_host_args(&self) -> usize {
        self.arg_name_list.len()
    }

    /// Host-visible parameters without a default
    pub fn n_required_args(&self) -> usize {
        self.host_to_native
            .iter()
            .filter(|&&c| !self.args[c].has_default)
            .count()
    }

    pub fn has_return(&self) -> bool {
        !self.skip_return && !self.return_cache.is_void()
    }

    /// Logical outputs: return value (if any) plus visible out-arguments
    pub fn n_outputs(&self) -> usize {
        self.to_host_args.len() + usize::from(self.has_return())
    }

    pub fn host_arg(&self, host_index: usize) -> Option<&ArgCache> {
        self.host_to_native.get(host_index).map(|&c| &self.args[c])
    }
}

/// Declared arguments, with an implicit leading receiver for methods
fn effective_args(info: &CallableInfo) -> Vec<ArgInfo> {
    let mut args = Vec::with_capacity(info.args.len() + 1);
    if let Some(instance) = &info.instance {
        args.push(ArgInfo::new("self", instance.clone()));
    }
    args.extend(info.args.iter().cloned());
    args
}

/// Index used as `parent` when the return value owns a companion
fn return_index(info: &CallableInfo) -> usize {
    info.args.len() + usize::from(info.instance.is_some())
}

fn assign_roles(info: &CallableInfo, args: &[ArgInfo], offset: usize) -> Result<Vec<MetaRole>> {
    let name = info.full_name();
    let mut roles = vec![MetaRole::None; args.len()];
    let arg_name = |index: usize| args.get(index).map_or("return", |a| a.name.as_str());

    let claim = |roles: &mut Vec<MetaRole>, parent: usize, declared: usize, role: MetaRole| {
        let target = declared + offset;
        if target >= args.len() || target == parent {
            return Err(MarshalError::unsupported(format!(
                "{}(): argument '{}' names invalid companion index {}",
                name,
                arg_name(parent),
                declared
            )));
        }
        match roles[target] {
            MetaRole::None => {
                roles[target] = role;
                if let Some(parent_role) = roles.get_mut(parent) {
                    if *parent_role == MetaRole::None {
                        *parent_role = MetaRole::Parent;
                    }
                }
                Ok(())
            }
            // Several arrays may share one length companion
            MetaRole::Child { .. } if matches!(role, MetaRole::Child { .. }) => Ok(()),
            _ => Err(MarshalError::unsupported(format!(
                "{}(): argument '{}' is claimed by more than one companion",
                name, args[target].name
            ))),
        }
    };

    for (index, arg) in args.iter().enumerate() {
        // Inside a callback signature, the user-data slot names itself
        if !is_callback(arg) && arg.closure.map(|c| c + offset) == Some(index) {
            roles[index] = MetaRole::Closure { callback: index };
            continue;
        }
        match &arg.type_info.tag {
            TypeTag::Array { length: Some(length), .. } => {
                claim(&mut roles, index, *length, MetaRole::Child { parent: index })?;
            }
            TypeTag::Interface(InterfaceInfo::Callback(_)) => {
                if let Some(closure) = arg.closure {
                    claim(&mut roles, index, closure, MetaRole::Closure { callback: index })?;
                }
                if let Some(destroy) = arg.destroy {
                    claim(&mut roles, index, destroy, MetaRole::Child { parent: index })?;
                }
            }
            _ => {}
        }
    }

    if let TypeTag::Array { length: Some(length), .. } = &info.return_type.tag {
        let parent = return_index(info);
        claim(&mut roles, parent, *length, MetaRole::Child { parent })?;
    }

    Ok(roles)
}

fn build_arg(
    name: &str,
    arg: &ArgInfo,
    role: MetaRole,
    args: &[ArgInfo],
    offset: usize,
    foreign: &ForeignRegistry,
) -> Result<ArgCache> {
    let kind = match role {
        MetaRole::Child { parent } if args.get(parent).is_some_and(is_callback) => ArgKind::DestroyNotify,
        MetaRole::Closure { .. } => ArgKind::Void { is_pointer: true },
        _ => kind_for(name, &arg.name, &arg.type_info, arg, args, offset, foreign)?,
    };

    let mut cache = ArgCache::new(&arg.name, kind, arg.direction, arg.transfer);
    cache.meta = role;
    cache.has_default = arg.optional;
    cache.allow_none = arg.nullable || matches!(role, MetaRole::Closure { .. });
    if let Some(default) = &arg.default {
        cache.default_value = default.clone();
    }

    if arg.caller_allocates && arg.direction == Direction::Out {
        match &cache.kind {
            ArgKind::Struct(s) if s.foreign.is_none() => cache.is_caller_allocates = true,
            ArgKind::Array(array) => {
                if array.array_type == ArrayType::C && array.fixed_size.is_none() {
                    return Err(MarshalError::unsupported(format!(
                        "{}(): caller-allocated array '{}' has no fixed size",
                        name, arg.name
                    )));
                }
                cache.is_caller_allocates = true;
            }
            _ => {}
        }
    }

    Ok(cache)
}

fn is_callback(arg: &ArgInfo) -> bool {
    matches!(arg.type_info.tag, TypeTag::Interface(InterfaceInfo::Callback(_)))
}

fn kind_for(
    name: &str,
    arg_name: &str,
    type_info: &TypeInfo,
    arg: &ArgInfo,
    args: &[ArgInfo],
    offset: usize,
    foreign: &ForeignRegistry,
) -> Result<ArgKind> {
    let kind = match &type_info.tag {
        TypeTag::Void => ArgKind::Void {
            is_pointer: type_info.is_pointer,
        },
        TypeTag::Boolean => ArgKind::Boolean,
        TypeTag::Float => ArgKind::Float(FloatWidth::F32),
        TypeTag::Double => ArgKind::Float(FloatWidth::F64),
        TypeTag::UniChar => ArgKind::UniChar,
        TypeTag::Utf8 => ArgKind::Utf8,
        TypeTag::Filename => ArgKind::Filename,
        TypeTag::Error => ArgKind::Error,
        TypeTag::Array {
            array_type,
            element,
            fixed_size,
            zero_terminated,
            length,
        } => {
            if *array_type == ArrayType::C
                && fixed_size.is_none()
                && !zero_terminated
                && length.is_none()
            {
                return Err(MarshalError::unsupported(format!(
                    "{}(): C array '{}' has no length information",
                    name, arg_name
                )));
            }
            let parent = ArgCache::new(arg_name, ArgKind::Void { is_pointer: true }, arg.direction, arg.transfer);
            let element_kind = element_kind_for(name, arg_name, element, arg, args, offset, foreign)?;
            ArgKind::Array(Box::new(ArrayCache {
                element: ArgCache::element("item", element_kind, &parent),
                array_type: *array_type,
                fixed_size: *fixed_size,
                zero_terminated: *zero_terminated,
                length_index: length.map(|l| l + offset),
            }))
        }
        TypeTag::List { kind, element } => {
            let parent = ArgCache::new(arg_name, ArgKind::Void { is_pointer: true }, arg.direction, arg.transfer);
            let element_kind = element_kind_for(name, arg_name, element, arg, args, offset, foreign)?;
            ArgKind::List(Box::new(ListCache {
                element: ArgCache::element("item", element_kind, &parent),
                kind: *kind,
            }))
        }
        TypeTag::HashTable { key, value } => {
            let parent = ArgCache::new(arg_name, ArgKind::Void { is_pointer: true }, arg.direction, arg.transfer);
            let key_kind = element_kind_for(name, arg_name, key, arg, args, offset, foreign)?;
            let value_kind = element_kind_for(name, arg_name, value, arg, args, offset, foreign)?;
            ArgKind::HashTable(Box::new(HashCache {
                key: ArgCache::element("key", key_kind, &parent),
                value: ArgCache::element("value", value_kind, &parent),
            }))
        }
        TypeTag::Interface(iface) => match iface {
            InterfaceInfo::Enum(info) => ArgKind::Enum(Arc::clone(info)),
            InterfaceInfo::Flags(info) => ArgKind::Flags(Arc::clone(info)),
            InterfaceInfo::Object(info) => ArgKind::Object(Arc::clone(info)),
            InterfaceInfo::Struct(info) => {
                let marshaler = if info.is_foreign {
                    let found = foreign.lookup(&info.namespace, &info.name);
                    if found.is_none() {
                        return Err(MarshalError::unsupported(format!(
                            "{}(): no foreign converter registered for {}",
                            name,
                            info.full_name()
                        )));
                    }
                    found
                } else {
                    None
                };
                ArgKind::Struct(StructCache {
                    info: Arc::clone(info),
                    foreign: marshaler,
                })
            }
            InterfaceInfo::Callback(info) => {
                let cache = CallableCache::build(info, foreign)?;
                ArgKind::Callback(Box::new(CallbackCache {
                    info: Arc::clone(info),
                    cache: Arc::new(cache),
                    scope: arg.scope,
                    user_data_index: arg.closure.map(|c| c + offset),
                    destroy_index: arg.destroy.map(|d| d + offset),
                }))
            }
        },
        int_tag @ (TypeTag::Int8
        | TypeTag::UInt8
        | TypeTag::Int16
        | TypeTag::UInt16
        | TypeTag::Int32
        | TypeTag::UInt32
        | TypeTag::Int64
        | TypeTag::UInt64) => IntWidth::from_tag(int_tag)
            .map(ArgKind::Int)
            .ok_or_else(|| MarshalError::unsupported(format!("{}(): bad integer tag", name)))?,
    };
    Ok(kind)
}

fn element_kind_for(
    name: &str,
    arg_name: &str,
    element: &TypeInfo,
    arg: &ArgInfo,
    args: &[ArgInfo],
    offset: usize,
    foreign: &ForeignRegistry,
) -> Result<ArgKind> {
    match &element.tag {
        TypeTag::Void if !element.is_pointer => Err(MarshalError::unsupported(format!(
            "{}(): '{}' has void elements",
            name, arg_name
        ))),
        TypeTag::Error | TypeTag::Interface(InterfaceInfo::Callback(_)) => {
            Err(MarshalError::unsupported(format!(
                "{}(): '{}' has {} elements, which cannot be marshaled",
                name,
                arg_name,
                element.describe()
            )))
        }
        _ => kind_for(name, arg_name, element, arg, args, offset, foreign),
    }
}

/// A host-visible argument may be omitted when it is optional, or when it is
/// a nullable input followed only by omissible arguments.
fn assign_defaults(caches: &mut [ArgCache], host_to_native: &[usize]) {
    let mut trailing_defaults = true;
    for &c in host_to_native.iter().rev() {
        let cache = &mut caches[c];
        let explicit = cache.has_default || cache.is_closure();
        let nullable_tail = cache.allow_none && cache.direction == Direction::In && trailing_defaults;
        cache.has_default = explicit || nullable_tail;
        trailing_defaults &= cache.has_default;
    }
}
