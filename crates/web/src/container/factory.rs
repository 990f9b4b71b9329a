//! Service factories: function, constructor-injection and exception.
//!
//! A factory is the "how" of a descriptor. The three kinds:
//!
//! - **function**: a user closure of arity 0, 1 (container) or 2
//!   (container + storage), with fallible `try_` variants
//! - **injected**: constructor injection for an [`Injectable`] type; the
//!   dependency descriptor collections are prefetched at registration, so
//!   resolving an argument is one indexed lookup
//! - **exception**: a sentinel that fails every resolve with a stored
//!   diagnostic, used for registered-but-misconfigured services

use std::any::TypeId;
use std::fmt::{self, Debug, Formatter};

use crate::container::descriptor::DescriptorCollection;
use crate::container::error::ContainerError;
use crate::container::storage::{BoxedInstance, ServiceStorage};
use crate::container::Container;

type FactoryFn =
    Box<dyn Fn(&Container, &mut ServiceStorage) -> Result<BoxedInstance, ContainerError> + Send + Sync>;

type ConstructFn = Box<dyn Fn(&mut Dependencies<'_>) -> Result<BoxedInstance, ContainerError> + Send + Sync>;

pub enum ServiceFactory {
    /// Invokes a user-supplied callable
    Function(FactoryFn),
    /// Constructs an [`Injectable`] implementation from prefetched
    /// dependency collections
    Injected(InjectedFactory),
    /// Fails resolution with a stored diagnostic message
    Exception { type_name: &'static str, message: String },
}

impl ServiceFactory {
    /// Factory from a plain constructor closure.
    pub fn function<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Function(Box::new(move |_, _| Ok(Box::new(f()))))
    }

    /// Factory from a closure that inspects the container.
    pub fn with_container<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        Self::Function(Box::new(move |container, _| Ok(Box::new(f(container)))))
    }

    /// Factory from a closure that resolves further services through the
    /// container and the current storage.
    pub fn with_scope<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container, &mut ServiceStorage) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        Self::Function(Box::new(move |container, storage| {
            f(container, storage).map(|value| Box::new(value) as BoxedInstance)
        }))
    }

    /// Constructor-injection factory for `Impl`.
    ///
    /// Prefetches (or creates empty) the descriptor collection of every
    /// declared dependency so later resolution never touches the registry
    /// map.
    pub fn injected<Impl: Injectable>(container: &mut Container) -> Self {
        let collections = Impl::dependency_types()
            .into_iter()
            .map(|type_id| container.get_or_create_descriptors_by_id(type_id))
            .collect();
        Self::Injected(InjectedFactory {
            collections,
            construct: Box::new(|deps| Impl::construct(deps).map(|value| Box::new(value) as BoxedInstance)),
        })
    }

    /// Sentinel factory that reports `message` when resolved.
    pub fn exception<T: 'static>(message: impl Into<String>) -> Self {
        Self::Exception { type_name: std::any::type_name::<T>(), message: message.into() }
    }

    pub(crate) fn invoke(
        &self,
        container: &Container,
        storage: &mut ServiceStorage,
    ) -> Result<BoxedInstance, ContainerError> {
        match self {
            Self::Function(f) => f(container, storage),
            Self::Injected(injected) => {
                let mut deps = Dependencies {
                    container,
                    storage,
                    collections: &injected.collections,
                    index: 0,
                };
                (injected.construct)(&mut deps)
            }
            Self::Exception { type_name, message } => {
                Err(ContainerError::Misconfigured { type_name: *type_name, message: message.clone() })
            }
        }
    }
}

impl Debug for ServiceFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("ServiceFactory::Function"),
            Self::Injected(injected) => {
                write!(f, "ServiceFactory::Injected({} deps)", injected.collections.len())
            }
            Self::Exception { type_name, .. } => write!(f, "ServiceFactory::Exception({type_name})"),
        }
    }
}

pub struct InjectedFactory {
    collections: Vec<DescriptorCollection>,
    construct: ConstructFn,
}

impl Debug for InjectedFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedFactory").field("dependencies", &self.collections.len()).finish()
    }
}

/// A type constructible by the container.
///
/// `dependency_types` declares the service types of the constructor
/// arguments in order; `construct` pulls each one from the cursor. The
/// [`crate::injectable!`] macro writes both for plain structs.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependency_types() -> Vec<TypeId>;

    fn construct(deps: &mut Dependencies<'_>) -> Result<Self, ContainerError>;
}

/// The indexed cursor over an injected factory's prefetched dependency
/// collections. Each `next*` call consumes one declared dependency.
pub struct Dependencies<'a> {
    container: &'a Container,
    storage: &'a mut ServiceStorage,
    collections: &'a [DescriptorCollection],
    index: usize,
}

impl Dependencies<'_> {
    /// Resolves the next dependency with single-instance semantics.
    pub fn next<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T, ContainerError> {
        let collection = self.advance::<T>()?;
        self.container.resolve_last_in::<T>(&collection, self.storage)
    }

    /// Resolves the next dependency as the collection of every registered
    /// instance, in registration order.
    pub fn next_all<T: Clone + Send + Sync + 'static>(&mut self) -> Result<Vec<T>, ContainerError> {
        let collection = self.advance::<T>()?;
        let mut out = Vec::new();
        self.container.resolve_all_in::<T>(&collection, self.storage, &mut out)?;
        Ok(out)
    }

    fn advance<T>(&mut self) -> Result<DescriptorCollection, ContainerError> {
        let collection = self
            .collections
            .get(self.index)
            .cloned()
            .ok_or_else(|| ContainerError::misconfigured::<T>("constructor consumed more dependencies than declared"))?;
        self.index += 1;
        Ok(collection)
    }
}

impl Debug for Dependencies<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("index", &self.index)
            .field("total", &self.collections.len())
            .finish()
    }
}

/// Implements [`Injectable`] for a struct whose fields are all
/// single-instance dependencies.
///
/// ```no_run
/// use std::sync::Arc;
/// use coral_web::injectable;
///
/// #[derive(Clone)]
/// struct Database;
///
/// #[derive(Clone)]
/// struct UserService {
///     database: Arc<Database>,
/// }
///
/// injectable!(UserService { database: Arc<Database> });
/// ```
///
/// Collection-typed dependencies need a manual [`Injectable`] impl using
/// [`Dependencies::next_all`].
#[macro_export]
macro_rules! injectable {
    ($name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        impl $crate::container::Injectable for $name {
            fn dependency_types() -> ::std::vec::Vec<::std::any::TypeId> {
                ::std::vec![$(::std::any::TypeId::of::<$ty>()),*]
            }

            fn construct(
                deps: &mut $crate::container::Dependencies<'_>,
            ) -> ::std::result::Result<Self, $crate::container::ContainerError> {
                Ok(Self { $($field: deps.next::<$ty>()?),* })
            }
        }
    };
}
