//! Basic example demonstrating how to create a simple web server with coral.
//! This example shows:
//! - How to define route handlers
//! - How to set up the routing handler inside a pipeline
//! - How to configure and start a server

use async_trait::async_trait;
use coral_http::config::ServerConfig;
use coral_http::handler::{HandlerError, Next, Pipeline, RequestHandler};
use coral_http::protocol::{Request, Response};
use coral_http::server::Server;
use coral_web::router::RoutingHandler;
use http::Method;

/// A simple handler that returns "hello world"
struct HelloWorld;

#[async_trait]
impl RequestHandler for HelloWorld {
    async fn handle(
        &self,
        _request: &mut Request,
        response: &mut Response,
        _next: Next<'_>,
    ) -> Result<(), HandlerError> {
        response.headers_mut().set("Content-Type", "text/plain");
        response.append_body_static("hello world");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    // Routes live in a per-method pattern tree; unmatched requests fall
    // through to the pipeline's terminal 404 handler.
    let mut router = RoutingHandler::new();
    router.route(Method::GET, "/", HelloWorld).unwrap();

    let pipeline = Pipeline::builder().add(router).build();

    let config = ServerConfig {
        listen_addresses: vec!["127.0.0.1:3000".to_string()],
        ..ServerConfig::default()
    };

    let mut server = Server::builder().config(config).pipeline(pipeline).build().unwrap();
    server.start().await.unwrap();

    // Serve until ctrl-c, then drain connections gracefully.
    tokio::signal::ctrl_c().await.unwrap();
    server.stop().await;
}
