//! Server lifecycle: listeners, accept loops and graceful stop.
//!
//! A [`Server`] binds one listener per configured address, runs an accept
//! loop per listener and spawns one tracked task per connection. Stopping
//! cancels the shared token (which ends the accept loops and asks every
//! connection to finish) and then awaits the task tracker, so `stop`
//! returns only after all connections have wound down.
//!
//! # Examples
//!
//! ```no_run
//! use coral_http::config::ServerConfig;
//! use coral_http::handler::Pipeline;
//! use coral_http::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         listen_addresses: vec![":3000".to_string()],
//!         ..ServerConfig::default()
//!     };
//!     let pipeline = Pipeline::builder().build();
//!
//!     let mut server = Server::builder()
//!         .config(config)
//!         .pipeline(pipeline)
//!         .build()
//!         .unwrap();
//!     server.start().await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.stop().await;
//! }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{AddressError, ServerConfig, parse_listen_address};
use crate::connection::Http1Connection;
use crate::handler::Pipeline;

const LISTEN_BACKLOG: u32 = 1024;

/// Errors surfaced while constructing a [`Server`].
#[derive(Error, Debug)]
pub enum ServerBuildError {
    /// No handler pipeline was configured
    #[error("pipeline must be set")]
    MissingPipeline,
}

/// Errors surfaced by [`Server::start`].
#[derive(Error, Debug)]
pub enum ServerError {
    /// Start was called on a server that is stopping or stopped
    #[error("can't start http server while stopping")]
    AlreadyStopping,

    /// Neither configured addresses nor pre-bound listeners exist
    #[error("no listen addresses configured")]
    MissingAddress,

    /// A configured listen address did not parse
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Binding a listener failed
    #[error("failed to bind listener: {source}")]
    Bind {
        #[from]
        source: io::Error,
    },
}

/// Builder for a [`Server`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    pipeline: Option<Pipeline>,
    listeners: Vec<TcpListener>,
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Adds a pre-bound listener, used in addition to the configured
    /// addresses. Handy for tests binding an ephemeral port.
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let pipeline = self.pipeline.ok_or(ServerBuildError::MissingPipeline)?;
        Ok(Server {
            config: Arc::new(self.config),
            pipeline: Arc::new(pipeline),
            staged_listeners: self.listeners,
            local_addrs: Vec::new(),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            stopping: AtomicBool::new(false),
        })
    }
}

/// The HTTP server: a listener set, a connection set and a stopping flag.
#[derive(Debug)]
pub struct Server {
    config: Arc<ServerConfig>,
    pipeline: Arc<Pipeline>,
    staged_listeners: Vec<TcpListener>,
    local_addrs: Vec<SocketAddr>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stopping: AtomicBool,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Binds every configured address and starts the accept loops.
    ///
    /// Fails with [`ServerError::AlreadyStopping`] once [`Server::stop`]
    /// has begun.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(ServerError::AlreadyStopping);
        }

        // parse everything before binding anything, so a bad address does
        // not leave half the listener set running
        let mut addrs = Vec::with_capacity(self.config.listen_addresses.len());
        for address in &self.config.listen_addresses {
            addrs.push(parse_listen_address(address)?);
        }

        let mut listeners = std::mem::take(&mut self.staged_listeners);
        for addr in addrs {
            listeners.push(bind(addr)?);
        }
        if listeners.is_empty() {
            return Err(ServerError::MissingAddress);
        }

        for listener in listeners {
            let addr = listener.local_addr().map_err(ServerError::from)?;
            self.local_addrs.push(addr);
            info!(%addr, "start listening for http connections");

            let pipeline = Arc::clone(&self.pipeline);
            let config = Arc::clone(&self.config);
            let shutdown = self.shutdown.clone();
            let tracker = self.tracker.clone();
            self.tracker.spawn(accept_loop(listener, addr, pipeline, config, shutdown, tracker));
        }

        Ok(())
    }

    /// The addresses the server is actually bound to; useful when a
    /// pre-bound listener used an ephemeral port.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stops accepting, asks every connection to finish and waits for all
    /// of them. Idempotent.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("http server stopped");
    }
}

fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

/// Accepts connections until the shutdown token fires or accept fails.
/// An accept error terminates only this listener.
async fn accept_loop(
    listener: TcpListener,
    addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let stream = select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(%addr, "stop listening for http connections");
                return;
            }
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted http connection");
                    stream
                }
                Err(e) => {
                    warn!(%addr, "accept failed, stop listening, cause: {}", e);
                    return;
                }
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set nodelay, cause: {}", e);
        }

        let connection =
            Http1Connection::new(stream, Arc::clone(&pipeline), Arc::clone(&config), shutdown.child_token());
        tracker.spawn(async move {
            match connection.process().await {
                Ok(()) => debug!("connection finished"),
                Err(e) => debug!("connection ended with error: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_requires_a_pipeline() {
        let result = Server::builder().build();
        assert!(matches!(result, Err(ServerBuildError::MissingPipeline)));
    }

    #[tokio::test]
    async fn start_requires_an_address() {
        let mut server =
            Server::builder().pipeline(Pipeline::builder().build()).build().unwrap();
        assert!(matches!(server.start().await, Err(ServerError::MissingAddress)));
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let mut server =
            Server::builder().pipeline(Pipeline::builder().build()).build().unwrap();
        server.stop().await;
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStopping)));
    }

    #[tokio::test]
    async fn bad_configured_address_fails_start() {
        let config = ServerConfig {
            listen_addresses: vec!["localhost:80".to_string()],
            ..ServerConfig::default()
        };
        let mut server = Server::builder()
            .config(config)
            .pipeline(Pipeline::builder().build())
            .build()
            .unwrap();
        assert!(matches!(server.start().await, Err(ServerError::Address(_))));
    }
}
