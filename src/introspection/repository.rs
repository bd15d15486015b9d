//! In-process metadata repository

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::callable::CallableInfo;
use super::types::InterfaceInfo;

/// Reflective metadata, queryable without invoking anything
pub trait MetadataSource: Send + Sync {
    fn find_callable(&self, namespace: &str, name: &str) -> Option<Arc<CallableInfo>>;

    fn find_type(&self, namespace: &str, name: &str) -> Option<InterfaceInfo>;
}

type Key = (String, String);

#[derive(Debug, Default)]
pub struct Repository {
    callables: DashMap<Key, Arc<CallableInfo>>,
    types: DashMap<Key, InterfaceInfo>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callable(&self, info: Arc<CallableInfo>) {
        debug!(event = "register_callable", callable = %info.full_name());
        self.callables
            .insert((info.namespace.clone(), info.name.clone()), info);
    }

    pub fn register_type(&self, info: InterfaceInfo) {
        let full = info.full_name();
        let (namespace, name) = full.split_once('.').unwrap_or(("", full.as_str()));
        debug!(event = "register_type", type_name = %full);
        self.types.insert((namespace.to_string(), name.to_string()), info);
    }

    pub fn callable_count(&self) -> usize {
        self.callables.len()
    }

    /// Callables registered under one namespace, sorted by name
    pub fn callables_in(&self, namespace: &str) -> Vec<Arc<CallableInfo>> {
        let mut found: Vec<_> = self
            .callables
            .iter()
            .filter(|e| e.key().0 == namespace)
            .map(|e| Arc::clone(e.value()))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}

impl MetadataSource for Repository {
    fn find_callable(&self, namespace: &str, name: &str) -> Option<Arc<CallableInfo>> {
        self.callables
            .get(&(namespace.to_string(), name.to_string()))
            .map(|e| Arc::clone(e.value()))
    }

    fn find_type(&self, namespace: &str, name: &str) -> Option<InterfaceInfo> {
        self.types
            .get(&(namespace.to_string(), name.to_string()))
            .map(|e| e.value().clone())
    }
}
