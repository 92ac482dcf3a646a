//! The module host (spec.md §4.9): a process-wide registry of module
//! factories, instantiated once per [`crate::client::Client`], with a
//! two-phase start (`init` then `run`) and cross-module lookup by type.
//!
//! Grounded on `crates/network/server/src/session.rs`'s registry-by-id
//! shape, adapted here from an id-keyed store to a type-keyed one since
//! spec.md §4.9 requires `client.get_module<T>()`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::client::Client;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A per-client module. `init` runs synchronously before any module's
/// `run` starts, so modules can create whiteboard/messageboard waiters
/// without racing each other; `run` is launched on its own cooperative
/// task (spec.md §4.9).
pub trait Module: Any + Send + Sync {
    fn init(&self, client: &Arc<Client>);
    fn run(self: Arc<Self>, client: Arc<Client>) -> BoxFuture;
}

type Factory = Box<dyn Fn() -> ModuleHandle + Send + Sync>;

struct ModuleHandle {
    type_id: TypeId,
    module: Arc<dyn Module>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Process-wide registry of module factories, populated at startup
/// (spec.md §4.9: "a discovery pass collects all compile-time Module
/// factories").
#[derive(Default)]
pub struct ModuleRegistry {
    factories: Vec<Factory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for module type `M`. `factory` is typically a
    /// `fn() -> Arc<M>` associated function or a plain closure.
    pub fn register<M, F>(mut self, factory: F) -> Self
    where
        M: Module + 'static,
        F: Fn() -> Arc<M> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(move || {
            let instance = factory();
            ModuleHandle {
                type_id: TypeId::of::<M>(),
                any: instance.clone(),
                module: instance,
            }
        }));
        self
    }

    pub(crate) fn instantiate(&self) -> ModuleHost {
        let handles = self.factories.iter().map(|factory| factory()).collect();
        ModuleHost::new(handles)
    }
}

/// One client's instantiated modules: one of each registered factory, per
/// spec.md §4.9.
pub struct ModuleHost {
    handles: Vec<ModuleHandle>,
}

impl ModuleHost {
    fn new(handles: Vec<ModuleHandle>) -> Self {
        Self { handles }
    }

    pub fn modules(&self) -> impl Iterator<Item = Arc<dyn Module>> + '_ {
        self.handles.iter().map(|handle| handle.module.clone())
    }

    /// Looks up the instance of module type `T`, if one was registered
    /// (spec.md §4.9: "Modules may look up peer modules by type").
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.handles
            .iter()
            .find(|handle| handle.type_id == TypeId::of::<T>())
            .and_then(|handle| handle.any.clone().downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;

    struct Echo(&'static str);

    impl Module for Echo {
        fn init(&self, _client: &Arc<Client>) {}
        fn run(self: Arc<Self>, _client: Arc<Client>) -> BoxFuture {
            Box::pin(async move {})
        }
    }

    #[test]
    fn get_returns_the_registered_instance() {
        let registry = ModuleRegistry::new().register(|| Arc::new(Echo("hi")));
        let host = registry.instantiate();
        let echo = host.get::<Echo>().expect("Echo module registered");
        assert_eq!(echo.0, "hi");
    }

    #[test]
    fn get_returns_none_for_unregistered_type() {
        struct Other;
        let registry = ModuleRegistry::new().register(|| Arc::new(Echo("hi")));
        let host = registry.instantiate();
        assert!(host.get::<Other>().is_none());
    }

    #[test]
    fn modules_iterates_every_registered_instance() {
        struct Second;
        impl Module for Second {
            fn init(&self, _client: &Arc<Client>) {}
            fn run(self: Arc<Self>, _client: Arc<Client>) -> BoxFuture {
                Box::pin(async move {})
            }
        }

        let registry = ModuleRegistry::new()
            .register(|| Arc::new(Echo("a")))
            .register(|| Arc::new(Second));
        let host = registry.instantiate();
        assert_eq!(host.modules().count(), 2);
    }
}
