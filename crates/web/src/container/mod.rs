//! The dependency-injection container.
//!
//! Registration maps a service type to an ordered collection of
//! [`ServiceDescriptor`]s; resolution walks that collection. `get` applies
//! single-instance semantics (the last registered descriptor wins),
//! `get_many` appends one instance per descriptor. Lifetimes:
//!
//! - [`ServiceLifetime::Transient`]: the factory runs on every resolve
//! - [`ServiceLifetime::Persistent`]: the factory runs once, the instance
//!   is cached inside the descriptor for the container's lifetime
//! - [`ServiceLifetime::StoragePersistent`]: one instance per
//!   [`ServiceStorage`], i.e. per request
//!
//! The container is populated during startup (`&mut self` registration)
//! and read-only afterwards; resolution is `&self` and lock-free apart
//! from the storage it writes into. Services are handed out by value, so
//! every service type is `Clone + Send + Sync`, `Arc`-wrapped in
//! practice.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use coral_web::container::{
//!     Container, ServiceDescriptor, ServiceFactory, ServiceLifetime, ServiceStorage,
//! };
//!
//! #[derive(Clone)]
//! struct Greeter {
//!     greeting: &'static str,
//! }
//!
//! let mut container = Container::new();
//! container.add::<Arc<Greeter>>(ServiceDescriptor::new(
//!     ServiceLifetime::Persistent,
//!     ServiceFactory::function(|| Arc::new(Greeter { greeting: "hello" })),
//! ));
//!
//! let mut storage = ServiceStorage::new();
//! let greeter = container.get::<Arc<Greeter>>(&mut storage).unwrap();
//! assert_eq!(greeter.greeting, "hello");
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

mod descriptor;
mod error;
mod factory;
mod storage;

pub use descriptor::{DescriptorCollection, ServiceDescriptor, ServiceLifetime};
pub use error::ContainerError;
pub use factory::{Dependencies, Injectable, InjectedFactory, ServiceFactory};
pub use storage::ServiceStorage;

use storage::BoxedInstance;

#[derive(Debug, Default)]
pub struct Container {
    registry: HashMap<TypeId, DescriptorCollection>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor to the collection registered for `T`.
    pub fn add<T: 'static>(&mut self, descriptor: ServiceDescriptor) {
        self.get_or_create_descriptors_by_id(TypeId::of::<T>()).push(Arc::new(descriptor));
    }

    /// Registers a pre-built Persistent instance of `T`.
    pub fn add_instance<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.add::<T>(ServiceDescriptor::instance(value));
    }

    /// Registers `Impl` as a constructor-injected descriptor for type
    /// `Impl` itself.
    pub fn add_injected<Impl: Injectable + Clone>(&mut self, lifetime: ServiceLifetime) {
        let factory = ServiceFactory::injected::<Impl>(self);
        self.add::<Impl>(ServiceDescriptor::new(lifetime, factory));
    }

    /// The descriptor collection registered for `T`, if any.
    pub fn descriptors_of<T: 'static>(&self) -> Option<DescriptorCollection> {
        self.registry.get(&TypeId::of::<T>()).cloned()
    }

    /// Gets or creates the (possibly still empty) descriptor collection
    /// for a type id. Injection factories prefetch through this, so a
    /// dependency registered later is still observed.
    pub(crate) fn get_or_create_descriptors_by_id(&mut self, type_id: TypeId) -> DescriptorCollection {
        self.registry.entry(type_id).or_default().clone()
    }

    /// Resolves `T` with single-instance semantics: the last registered
    /// descriptor wins.
    pub fn get<T: Clone + Send + Sync + 'static>(
        &self,
        storage: &mut ServiceStorage,
    ) -> Result<T, ContainerError> {
        let collection =
            self.registry.get(&TypeId::of::<T>()).ok_or_else(ContainerError::unresolvable::<T>)?;
        self.resolve_last_in::<T>(collection, storage)
    }

    /// Appends one instance of `T` per registered descriptor, in
    /// registration order. An unregistered type appends nothing.
    pub fn get_many<T: Clone + Send + Sync + 'static>(
        &self,
        storage: &mut ServiceStorage,
        out: &mut Vec<T>,
    ) -> Result<(), ContainerError> {
        match self.registry.get(&TypeId::of::<T>()) {
            Some(collection) => self.resolve_all_in::<T>(collection, storage, out),
            None => Ok(()),
        }
    }

    pub(crate) fn resolve_last_in<T: Clone + Send + Sync + 'static>(
        &self,
        collection: &DescriptorCollection,
        storage: &mut ServiceStorage,
    ) -> Result<T, ContainerError> {
        let descriptors = collection.load();
        let descriptor = descriptors.last().ok_or_else(ContainerError::unresolvable::<T>)?;
        self.resolve_descriptor::<T>(descriptor, storage)
    }

    pub(crate) fn resolve_all_in<T: Clone + Send + Sync + 'static>(
        &self,
        collection: &DescriptorCollection,
        storage: &mut ServiceStorage,
        out: &mut Vec<T>,
    ) -> Result<(), ContainerError> {
        let descriptors = collection.load();
        out.reserve(descriptors.len());
        for descriptor in descriptors.iter() {
            out.push(self.resolve_descriptor::<T>(descriptor, storage)?);
        }
        Ok(())
    }

    fn resolve_descriptor<T: Clone + Send + Sync + 'static>(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        storage: &mut ServiceStorage,
    ) -> Result<T, ContainerError> {
        // descriptor identity keys both the cycle markers and the
        // per-storage cache
        let key = Arc::as_ptr(descriptor) as usize;

        match descriptor.lifetime() {
            ServiceLifetime::Transient => {
                let boxed = self.invoke_guarded::<T>(descriptor, key, storage)?;
                downcast_owned::<T>(boxed)
            }

            ServiceLifetime::Persistent => {
                if let Some(cached) = descriptor.cached().get() {
                    return downcast_cloned::<T>(cached);
                }
                let boxed = self.invoke_guarded::<T>(descriptor, key, storage)?;
                // under concurrent first resolves only one instance wins
                let cached = descriptor.cached().get_or_init(|| boxed);
                downcast_cloned::<T>(cached)
            }

            ServiceLifetime::StoragePersistent => {
                if let Some(existing) = storage.get(key) {
                    return downcast_cloned::<T>(existing);
                }
                let boxed = self.invoke_guarded::<T>(descriptor, key, storage)?;
                let value = downcast_owned::<T>(boxed)?;
                storage.set(key, Box::new(value.clone()));
                Ok(value)
            }
        }
    }

    /// Invokes the factory with the in-resolve marker held, so recursion
    /// onto the same descriptor surfaces as a cycle instead of looping.
    fn invoke_guarded<T>(
        &self,
        descriptor: &ServiceDescriptor,
        key: usize,
        storage: &mut ServiceStorage,
    ) -> Result<BoxedInstance, ContainerError> {
        storage.begin_resolve(key).map_err(|_| ContainerError::cycle::<T>())?;
        let result = descriptor.factory().invoke(self, storage);
        storage.end_resolve(key);
        result
    }
}

fn downcast_owned<T: 'static>(boxed: BoxedInstance) -> Result<T, ContainerError> {
    boxed.downcast::<T>().map(|value| *value).map_err(|_| ContainerError::type_mismatch::<T>())
}

fn downcast_cloned<T: Clone + 'static>(boxed: &BoxedInstance) -> Result<T, ContainerError> {
    boxed.downcast_ref::<T>().cloned().ok_or_else(ContainerError::type_mismatch::<T>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[derive(Clone)]
    struct Value(Arc<usize>);

    #[test]
    fn unknown_type_is_unresolvable() {
        let container = Container::new();
        let mut storage = ServiceStorage::new();
        let result = container.get::<Value>(&mut storage);
        assert!(matches!(result, Err(ContainerError::Unresolvable { .. })));
    }

    #[test]
    fn transient_returns_distinct_instances() {
        let mut container = Container::new();
        container.add::<Value>(ServiceDescriptor::new(
            ServiceLifetime::Transient,
            ServiceFactory::function(|| Value(Arc::new(1))),
        ));

        let mut storage = ServiceStorage::new();
        let a = container.get::<Value>(&mut storage).unwrap();
        let b = container.get::<Value>(&mut storage).unwrap();
        assert!(!Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn persistent_returns_the_same_instance() {
        let invocations = counter();
        let mut container = Container::new();
        container.add::<Value>(ServiceDescriptor::new(ServiceLifetime::Persistent, {
            let invocations = Arc::clone(&invocations);
            ServiceFactory::function(move || {
                invocations.fetch_add(1, Ordering::SeqCst);
                Value(Arc::new(7))
            })
        }));

        let mut storage = ServiceStorage::new();
        let a = container.get::<Value>(&mut storage).unwrap();
        let mut other_storage = ServiceStorage::new();
        let b = container.get::<Value>(&mut other_storage).unwrap();

        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn storage_persistent_is_cached_per_storage() {
        let mut container = Container::new();
        container.add::<Value>(ServiceDescriptor::new(
            ServiceLifetime::StoragePersistent,
            ServiceFactory::function(|| Value(Arc::new(3))),
        ));

        let mut storage = ServiceStorage::new();
        let a = container.get::<Value>(&mut storage).unwrap();
        let b = container.get::<Value>(&mut storage).unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));

        let mut other_storage = ServiceStorage::new();
        let c = container.get::<Value>(&mut other_storage).unwrap();
        assert!(!Arc::ptr_eq(&a.0, &c.0));
    }

    #[test]
    fn get_uses_the_last_registered_descriptor() {
        let mut container = Container::new();
        container.add_instance::<&'static str>("first");
        container.add_instance::<&'static str>("second");

        let mut storage = ServiceStorage::new();
        assert_eq!(container.get::<&'static str>(&mut storage).unwrap(), "second");
    }

    #[test]
    fn get_many_appends_in_registration_order() {
        let mut container = Container::new();
        container.add_instance::<&'static str>("first");
        container.add_instance::<&'static str>("second");

        let mut storage = ServiceStorage::new();
        let mut out = Vec::new();
        container.get_many::<&'static str>(&mut storage, &mut out).unwrap();
        assert_eq!(out, vec!["first", "second"]);

        // unknown types append nothing
        let mut empty = Vec::new();
        container.get_many::<Value>(&mut storage, &mut empty).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn exception_factory_surfaces_its_message() {
        let mut container = Container::new();
        container.add::<Value>(ServiceDescriptor::new(
            ServiceLifetime::Transient,
            ServiceFactory::exception::<Value>("registered without a backend"),
        ));

        let mut storage = ServiceStorage::new();
        let result = container.get::<Value>(&mut storage);
        match result {
            Err(ContainerError::Misconfigured { message, .. }) => {
                assert!(message.contains("registered without a backend"));
            }
            Err(e) => panic!("expected misconfigured error, got {e}"),
            Ok(_) => panic!("expected misconfigured error, got an instance"),
        }
    }

    #[derive(Clone)]
    struct Dep(Arc<usize>);

    #[derive(Clone)]
    struct Svc {
        dep: Dep,
    }

    crate::injectable!(Svc { dep: Dep });

    #[test]
    fn constructor_injection_resolves_dependencies() {
        let mut container = Container::new();
        container.add::<Dep>(ServiceDescriptor::new(
            ServiceLifetime::Transient,
            ServiceFactory::function(|| Dep(Arc::new(11))),
        ));
        container.add_injected::<Svc>(ServiceLifetime::Persistent);

        let mut storage = ServiceStorage::new();
        let a = container.get::<Svc>(&mut storage).unwrap();
        let b = container.get::<Svc>(&mut storage).unwrap();

        // persistent service keeps the dependency captured at creation
        assert!(Arc::ptr_eq(&a.dep.0, &b.dep.0));

        // resolving the transient dependency directly yields fresh instances
        let d1 = container.get::<Dep>(&mut storage).unwrap();
        let d2 = container.get::<Dep>(&mut storage).unwrap();
        assert!(!Arc::ptr_eq(&d1.0, &d2.0));
        assert!(!Arc::ptr_eq(&a.dep.0, &d1.0));
    }

    #[test]
    fn injection_prefetch_observes_later_registration() {
        let mut container = Container::new();
        // the dependency is registered after the injected service
        container.add_injected::<Svc>(ServiceLifetime::Transient);
        container.add::<Dep>(ServiceDescriptor::new(
            ServiceLifetime::Transient,
            ServiceFactory::function(|| Dep(Arc::new(5))),
        ));

        let mut storage = ServiceStorage::new();
        let service = container.get::<Svc>(&mut storage).unwrap();
        assert_eq!(*service.dep.0, 5);
    }

    #[derive(Clone)]
    struct SelfReferential;

    impl Injectable for SelfReferential {
        fn dependency_types() -> Vec<std::any::TypeId> {
            vec![std::any::TypeId::of::<SelfReferential>()]
        }

        fn construct(deps: &mut Dependencies<'_>) -> Result<Self, ContainerError> {
            deps.next::<SelfReferential>()?;
            Ok(SelfReferential)
        }
    }

    #[test]
    fn dependency_cycles_are_detected() {
        let mut container = Container::new();
        container.add_injected::<SelfReferential>(ServiceLifetime::Transient);

        let mut storage = ServiceStorage::new();
        let result = container.get::<SelfReferential>(&mut storage);
        assert!(matches!(result, Err(ContainerError::Cycle { .. })));
    }

    #[derive(Clone)]
    struct Plugins {
        names: Vec<&'static str>,
    }

    impl Injectable for Plugins {
        fn dependency_types() -> Vec<std::any::TypeId> {
            vec![std::any::TypeId::of::<&'static str>()]
        }

        fn construct(deps: &mut Dependencies<'_>) -> Result<Self, ContainerError> {
            Ok(Plugins { names: deps.next_all::<&'static str>()? })
        }
    }

    #[test]
    fn collection_dependencies_resolve_every_descriptor() {
        let mut container = Container::new();
        container.add_instance::<&'static str>("alpha");
        container.add_instance::<&'static str>("beta");
        container.add_injected::<Plugins>(ServiceLifetime::Transient);

        let mut storage = ServiceStorage::new();
        let plugins = container.get::<Plugins>(&mut storage).unwrap();
        assert_eq!(plugins.names, vec!["alpha", "beta"]);
    }
}
