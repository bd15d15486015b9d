//! Positional and keyword argument combination

use std::sync::Arc;
use tracing::trace;

use crate::cache::CallableCache;
use crate::errors::{MarshalError, Result};
use crate::host::HostValue;

/// One host-visible argument after combination
#[derive(Debug, Clone, PartialEq)]
pub enum HostArg {
    Value(HostValue),
    /// Omitted; the argument's native default is used
    Default,
}

impl HostArg {
    pub fn value(&self) -> Option<&HostValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Default => None,
        }
    }
}

/// Arity error; `too_many` picks the bound reported when defaults exist
fn count_error(cache: &CallableCache, given: usize, too_many: bool) -> MarshalError {
    let total = cache.n_host_args();
    let required = cache.n_required_args();
    let (bound, expected) = match (required == total, too_many) {
        (true, _) => ("exactly", total),
        (false, true) => ("at most", total),
        (false, false) => ("at least", required),
    };
    MarshalError::type_error(format!(
        "{}() takes {} {} argument{} ({} given)",
        cache.name,
        bound,
        expected,
        if expected == 1 { "" } else { "s" },
        given
    ))
}

/// Merge positional and keyword arguments into `arg_name_list` order.
///
/// Excess positional arguments are packed into a tuple when the last
/// parameter is callback user data; otherwise they are an error.
pub fn combine_args(
    cache: &CallableCache,
    args: &[HostValue],
    kwargs: &[(&str, HostValue)],
) -> Result<Vec<HostArg>> {
    let n_expected = cache.n_host_args();
    let given = args.len() + kwargs.len();

    let mut positional: Vec<HostValue> = args.to_vec();
    if let Some(varargs) = cache.user_data_varargs_index {
        if positional.len() > varargs {
            let packed: Vec<HostValue> = positional.split_off(varargs);
            positional.push(HostValue::Tuple(Arc::from(packed)));
        }
    }
    if positional.len() > n_expected {
        return Err(count_error(cache, given, true));
    }

    let mut combined: Vec<Option<HostValue>> = positional.into_iter().map(Some).collect();
    combined.resize(n_expected, None);

    for (name, value) in kwargs {
        let Some(&index) = cache.arg_name_index.get(*name) else {
            return Err(MarshalError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                cache.name, name
            )));
        };
        if combined[index].is_some() {
            return Err(MarshalError::type_error(format!(
                "{}() got multiple values for keyword argument '{}'",
                cache.name, name
            )));
        }
        combined[index] = Some(value.clone());
    }

    let mut host_args = Vec::with_capacity(n_expected);
    for (host_index, slot) in combined.into_iter().enumerate() {
        match slot {
            Some(value) => host_args.push(HostArg::Value(value)),
            None if cache.host_arg(host_index).is_some_and(|a| a.has_default) => {
                host_args.push(HostArg::Default)
            }
            None => return Err(count_error(cache, given, false)),
        }
    }
    trace!(event = "args_combined", callable = %cache.name, given, expected = n_expected);
    Ok(host_args)
}
