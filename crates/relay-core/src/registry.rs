//! Module registry: the ordered handler chain inbound requests dispatch
//! through.
//!
//! Modules are registered once, at session construction, in the order they
//! should be tried. [`ModuleRegistry::dispatch`] walks that order and stops
//! at the first module that sets `is_handled`, mirroring the spec's
//! short-circuiting handler chain.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use async_trait::async_trait;
use relay_proto::{Request, Response};

use crate::session::Session;

/// The request a module is asked to handle, and the response it should fill
/// in before returning.
pub struct RequestArgs {
    /// The inbound request.
    pub request: Request,
    /// The handler sets this before returning to indicate success; the
    /// session serializes it and replies with the originating `request_id`.
    pub response: Option<Response>,
}

impl RequestArgs {
    /// Wrap an inbound request with no response yet set.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self { request, response: None }
    }
}

/// One handler in the dispatch chain.
///
/// `handle_request` returns whether it handled the request (`is_handled`).
/// Returning `false` leaves `args` untouched and falls through to the next
/// module, then eventually to the session's `RequestReceived` callback if no
/// module claims it.
#[async_trait]
pub trait Module: Any + Send + Sync {
    /// Attempt to handle `args.request`, filling in `args.response` on
    /// success.
    async fn handle_request(&self, session: &Session, args: &mut RequestArgs) -> bool;

    /// Release any resources this module holds. Called once, in insertion
    /// order, when the owning session disposes. Default no-op: most modules
    /// hold nothing that needs explicit teardown.
    async fn dispose(&self) {}
}

/// Append-only, insertion-ordered collection of modules.
///
/// Lookup by concrete type is O(1) via an internal `TypeId` index;
/// dispatch walks insertion order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
    index_by_type: HashMap<TypeId, usize>,
}

impl ModuleRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module`, appending it to the dispatch chain.
    ///
    /// # Panics
    ///
    /// Panics if a module of this concrete type is already registered — the
    /// registry is append-only and type-keyed, so re-registering the same
    /// type is a programmer error, not a runtime condition to recover from.
    #[allow(clippy::panic)]
    pub fn register<M: Module + 'static>(&mut self, module: M) {
        let type_id = TypeId::of::<M>();
        if self.index_by_type.contains_key(&type_id) {
            panic!("invariant: module type registered twice");
        }
        self.index_by_type.insert(type_id, self.modules.len());
        self.modules.push(Box::new(module));
    }

    /// Look up a registered module by concrete type.
    #[must_use]
    pub fn get<M: Module + 'static>(&self) -> Option<&M> {
        let index = *self.index_by_type.get(&TypeId::of::<M>())?;
        (self.modules[index].as_ref() as &dyn Any).downcast_ref::<M>()
    }

    /// Walk the chain in insertion order, stopping at the first module that
    /// sets `is_handled`. Returns whether any module handled the request.
    pub async fn dispatch(&self, session: &Session, args: &mut RequestArgs) -> bool {
        for module in &self.modules {
            if module.handle_request(session, args).await {
                return true;
            }
        }
        false
    }

    /// Dispose every registered module, in insertion order.
    pub async fn dispose_all(&self) {
        for module in &self.modules {
            module.dispose().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Always(bool);

    #[async_trait]
    impl Module for Always {
        async fn handle_request(&self, _session: &Session, args: &mut RequestArgs) -> bool {
            if self.0 {
                args.response = Some(Response::ok(args.request.request_id));
            }
            self.0
        }
    }

    struct CountingModule(Arc<AtomicUsize>);

    #[async_trait]
    impl Module for CountingModule {
        async fn handle_request(&self, _session: &Session, _args: &mut RequestArgs) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    #[test]
    fn lookup_by_type_is_available_after_register() {
        let mut registry = ModuleRegistry::new();
        registry.register(Always(true));
        assert!(registry.get::<Always>().is_some());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_type_registration_panics() {
        let mut registry = ModuleRegistry::new();
        registry.register(Always(true));
        registry.register(Always(false));
    }
}
