//! Error taxonomy of service resolution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    /// No descriptor is registered for the requested type
    #[error("no service registered for type [{type_name}]")]
    Unresolvable { type_name: &'static str },

    /// Resolution recursed into a descriptor that is already resolving
    #[error("dependency cycle while resolving type [{type_name}]")]
    Cycle { type_name: &'static str },

    /// An exception factory was resolved, or a dependency list ran dry
    #[error("service type [{type_name}] is misconfigured: {message}")]
    Misconfigured { type_name: &'static str, message: String },

    /// The registered factory produced an instance of a different type
    #[error("factory for type [{type_name}] produced an instance of another type")]
    TypeMismatch { type_name: &'static str },
}

impl ContainerError {
    pub(crate) fn unresolvable<T>() -> Self {
        Self::Unresolvable { type_name: std::any::type_name::<T>() }
    }

    pub(crate) fn cycle<T>() -> Self {
        Self::Cycle { type_name: std::any::type_name::<T>() }
    }

    pub(crate) fn misconfigured<T>(message: impl Into<String>) -> Self {
        Self::Misconfigured { type_name: std::any::type_name::<T>(), message: message.into() }
    }

    pub(crate) fn type_mismatch<T>() -> Self {
        Self::TypeMismatch { type_name: std::any::type_name::<T>() }
    }
}
