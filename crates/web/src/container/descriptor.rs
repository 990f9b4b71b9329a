//! Service descriptors and their shared, ordered collections.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;

use crate::container::factory::ServiceFactory;
use crate::container::storage::BoxedInstance;

/// How long an instance produced by a descriptor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// A fresh instance on every resolve
    Transient,
    /// One instance for the container's lifetime, cached in the descriptor
    Persistent,
    /// One instance per service storage, i.e. per request
    StoragePersistent,
}

/// A registration record binding a service type to a factory and a
/// lifetime. Descriptor identity (its address inside the collection's
/// `Arc`) keys the per-storage instance cache.
pub struct ServiceDescriptor {
    lifetime: ServiceLifetime,
    factory: ServiceFactory,
    cached: OnceCell<BoxedInstance>,
}

impl ServiceDescriptor {
    pub fn new(lifetime: ServiceLifetime, factory: ServiceFactory) -> Self {
        Self { lifetime, factory, cached: OnceCell::new() }
    }

    /// A Persistent descriptor pre-seeded with an existing instance; its
    /// factory is never invoked.
    pub fn instance<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        let descriptor = Self::new(
            ServiceLifetime::Persistent,
            ServiceFactory::function({
                let value = value.clone();
                move || value.clone()
            }),
        );
        // the cell was just created, this cannot fail
        let _ = descriptor.cached.set(Box::new(value));
        descriptor
    }

    pub fn lifetime(&self) -> ServiceLifetime {
        self.lifetime
    }

    pub(crate) fn factory(&self) -> &ServiceFactory {
        &self.factory
    }

    pub(crate) fn cached(&self) -> &OnceCell<BoxedInstance> {
        &self.cached
    }
}

impl Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("lifetime", &self.lifetime)
            .field("cached", &self.cached.get().is_some())
            .finish()
    }
}

/// The ordered list of descriptors registered for one service type.
///
/// The list is shared: injection factories prefetch a handle per
/// dependency at registration time, and because reads go through an
/// [`ArcSwap`], those handles observe descriptors registered later.
/// Reads are lock-free; appends copy the (short) vector.
#[derive(Clone, Default)]
pub struct DescriptorCollection {
    inner: Arc<ArcSwap<Vec<Arc<ServiceDescriptor>>>>,
}

impl DescriptorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, descriptor: Arc<ServiceDescriptor>) {
        self.inner.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().map(Arc::clone));
            next.push(Arc::clone(&descriptor));
            next
        });
    }

    /// Snapshot of the current descriptor list, in registration order.
    pub fn load(&self) -> Arc<Vec<Arc<ServiceDescriptor>>> {
        self.inner.load_full()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl Debug for DescriptorCollection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCollection").field("len", &self.len()).finish()
    }
}
