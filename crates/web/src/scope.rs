//! Per-request service resolution scope.
//!
//! [`ServiceScope`] is a pipeline handler placed in front of handlers
//! that resolve services: it seeds every request's extensions with a
//! [`RequestServices`] (the shared container handle plus a fresh
//! [`ServiceStorage`]) and forwards. StoragePersistent services resolved
//! through that scope live exactly as long as the request.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use coral_http::handler::{HandlerError, Next, RequestHandler};
use coral_http::protocol::{Request, Response};

use crate::container::{Container, ContainerError, ServiceStorage};

/// The resolution scope a handler pulls out of the request extensions.
pub struct RequestServices {
    container: Arc<Container>,
    storage: ServiceStorage,
}

impl RequestServices {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container, storage: ServiceStorage::new() }
    }

    /// Resolves a service with single-instance semantics.
    pub fn resolve<T: Clone + Send + Sync + 'static>(&mut self) -> Result<T, ContainerError> {
        let Self { container, storage } = self;
        container.get(storage)
    }

    /// Resolves one instance per registered descriptor.
    pub fn resolve_all<T: Clone + Send + Sync + 'static>(&mut self) -> Result<Vec<T>, ContainerError> {
        let Self { container, storage } = self;
        let mut out = Vec::new();
        container.get_many(storage, &mut out)?;
        Ok(out)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn storage_mut(&mut self) -> &mut ServiceStorage {
        &mut self.storage
    }
}

impl Debug for RequestServices {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestServices").finish()
    }
}

/// Pipeline handler that attaches a [`RequestServices`] to every request.
pub struct ServiceScope {
    container: Arc<Container>,
}

impl ServiceScope {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }
}

impl Debug for ServiceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope").finish()
    }
}

#[async_trait]
impl RequestHandler for ServiceScope {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        request.extensions_mut().insert(RequestServices::new(Arc::clone(&self.container)));
        next.run(request, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ServiceDescriptor, ServiceFactory, ServiceLifetime};
    use coral_http::handler::Pipeline;

    #[derive(Clone)]
    struct Tracked(Arc<()>);

    struct ResolveTwice;

    #[async_trait]
    impl RequestHandler for ResolveTwice {
        async fn handle(
            &self,
            request: &mut Request,
            response: &mut Response,
            _next: Next<'_>,
        ) -> Result<(), HandlerError> {
            let services = request
                .extensions_mut()
                .get_mut::<RequestServices>()
                .ok_or("service scope missing")?;
            let a = services.resolve::<Tracked>()?;
            let b = services.resolve::<Tracked>()?;
            let same = Arc::ptr_eq(&a.0, &b.0);
            response.append_body_static(if same { "same" } else { "distinct" });
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_persistent_services_are_shared_within_a_request() {
        let mut container = Container::new();
        container.add::<Tracked>(ServiceDescriptor::new(
            ServiceLifetime::StoragePersistent,
            ServiceFactory::function(|| Tracked(Arc::new(()))),
        ));

        let pipeline = Pipeline::builder()
            .add(ServiceScope::new(Arc::new(container)))
            .add(ResolveTwice)
            .build();

        let mut request = Request::new();
        let mut response = Response::new();
        pipeline.dispatch(&mut request, &mut response).await.unwrap();
        assert_eq!(response.take_body().to_vec(), b"same");
    }
}
