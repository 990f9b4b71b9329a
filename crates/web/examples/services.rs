//! Dependency-injection example: a routed handler resolving services from
//! the container through the per-request scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use coral_http::buffer::ByteStr;
use coral_http::config::ServerConfig;
use coral_http::handler::{HandlerError, Next, Pipeline, RequestHandler};
use coral_http::protocol::{Request, Response};
use coral_http::server::Server;
use coral_web::container::{Container, ServiceDescriptor, ServiceFactory, ServiceLifetime};
use coral_web::injectable;
use coral_web::router::RoutingHandler;
use coral_web::scope::{RequestServices, ServiceScope};
use http::Method;

/// A process-wide counter, registered as a Persistent service.
#[derive(Clone)]
struct HitCounter {
    hits: Arc<AtomicU64>,
}

/// A service constructed by the container, depending on the counter.
#[derive(Clone)]
struct Greeter {
    counter: HitCounter,
}

injectable!(Greeter { counter: HitCounter });

impl Greeter {
    fn greet(&self) -> String {
        let n = self.counter.hits.fetch_add(1, Ordering::Relaxed) + 1;
        format!("hello, visitor #{n}\n")
    }
}

struct GreetHandler;

#[async_trait]
impl RequestHandler for GreetHandler {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        _next: Next<'_>,
    ) -> Result<(), HandlerError> {
        let services =
            request.extensions_mut().get_mut::<RequestServices>().ok_or("service scope missing")?;
        let greeter = services.resolve::<Greeter>()?;

        response.headers_mut().set("Content-Type", "text/plain");
        response.append_body(ByteStr::from(greeter.greet()).into_bytes());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let mut container = Container::new();
    container.add::<HitCounter>(ServiceDescriptor::new(
        ServiceLifetime::Persistent,
        ServiceFactory::function(|| HitCounter { hits: Arc::new(AtomicU64::new(0)) }),
    ));
    container.add_injected::<Greeter>(ServiceLifetime::Transient);

    let mut router = RoutingHandler::new();
    router.route(Method::GET, "/greet", GreetHandler).unwrap();

    let pipeline = Pipeline::builder()
        .add(ServiceScope::new(Arc::new(container)))
        .add(router)
        .build();

    let config = ServerConfig {
        listen_addresses: vec!["127.0.0.1:3000".to_string()],
        ..ServerConfig::default()
    };

    let mut server = Server::builder().config(config).pipeline(pipeline).build().unwrap();
    server.start().await.unwrap();

    tokio::signal::ctrl_c().await.unwrap();
    server.stop().await;
}
