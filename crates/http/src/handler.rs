//! The request handler pipeline.
//!
//! A pipeline is an ordered list of handlers. The connection dispatches a
//! request to the first handler; each handler either completes the
//! response or forwards to the rest of the chain through [`Next`]. The
//! chain is a read-only slice view, so handlers can only move forward and
//! can never reorder the pipeline. A terminal default handler answering
//! 404 is always appended by the builder.
//!
//! # Examples
//!
//! ```no_run
//! use coral_http::handler::{HandlerError, Next, Pipeline, RequestHandler};
//! use coral_http::protocol::{Request, Response};
//! use async_trait::async_trait;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl RequestHandler for Hello {
//!     async fn handle(
//!         &self,
//!         request: &mut Request,
//!         response: &mut Response,
//!         next: Next<'_>,
//!     ) -> Result<(), HandlerError> {
//!         if request.path() == "/hello" {
//!             response.append_body_static("world");
//!             Ok(())
//!         } else {
//!             next.run(request, response).await
//!         }
//!     }
//! }
//!
//! let pipeline = Pipeline::builder().add(Hello).build();
//! ```

use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;

use crate::protocol::{Request, Response};

/// The error type handlers may fail with; the connection maps it to a
/// generic 500 response.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// A polymorphic request handler.
///
/// Handlers that do not recognize a request forward it:
/// `next.run(request, response).await`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), HandlerError>;
}

/// The rest of the handler chain, a forward-only view.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Arc<dyn RequestHandler>],
}

impl<'a> Next<'a> {
    /// Invokes the next handler with the chain advanced by one.
    ///
    /// An exhausted chain answers 404; in practice the pipeline's terminal
    /// default handler is reached first.
    pub async fn run(self, request: &mut Request, response: &mut Response) -> Result<(), HandlerError> {
        match self.handlers.split_first() {
            Some((head, rest)) => head.handle(request, response, Next { handlers: rest }).await,
            None => {
                not_found(response);
                Ok(())
            }
        }
    }

    /// Number of handlers still ahead.
    pub fn remaining(&self) -> usize {
        self.handlers.len()
    }
}

impl Debug for Next<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.handlers.len()).finish()
    }
}

fn not_found(response: &mut Response) {
    response.set_status(StatusCode::NOT_FOUND);
    response.headers_mut().set("Content-Type", "text/plain");
    response.append_body_static("404 Not Found");
}

/// The terminal pipeline element.
#[derive(Debug, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl RequestHandler for NotFoundHandler {
    async fn handle(
        &self,
        _request: &mut Request,
        response: &mut Response,
        _next: Next<'_>,
    ) -> Result<(), HandlerError> {
        not_found(response);
        Ok(())
    }
}

/// An ordered, immutable handler list.
pub struct Pipeline {
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { handlers: Vec::new() }
    }

    /// Dispatches a request to the first handler.
    pub async fn dispatch(&self, request: &mut Request, response: &mut Response) -> Result<(), HandlerError> {
        Next { handlers: &self.handlers }.run(request, response).await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("len", &self.handlers.len()).finish()
    }
}

/// Builds a [`Pipeline`]; `build` appends the terminal 404 handler.
pub struct PipelineBuilder {
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl PipelineBuilder {
    pub fn add<H: RequestHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn add_shared(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(mut self) -> Pipeline {
        self.handlers.push(Arc::new(NotFoundHandler));
        Pipeline { handlers: self.handlers }
    }
}

impl Debug for PipelineBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder").field("len", &self.handlers.len()).finish()
    }
}

/// A handler backed by a boxed-future function.
///
/// ```no_run
/// use coral_http::handler::{HandlerError, handler_fn};
/// use coral_http::protocol::{Request, Response};
/// use futures::future::BoxFuture;
///
/// fn hello<'a>(
///     _request: &'a mut Request,
///     response: &'a mut Response,
/// ) -> BoxFuture<'a, Result<(), HandlerError>> {
///     Box::pin(async move {
///         response.append_body_static("hello");
///         Ok(())
///     })
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> RequestHandler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        _next: Next<'_>,
    ) -> Result<(), HandlerError> {
        (self.f)(request, response).await
    }
}

impl<F> Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish()
    }
}

/// Wraps a boxed-future function as a pipeline handler. The function
/// completes the response itself and never forwards.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagger {
        tag: &'static str,
        complete: bool,
    }

    #[async_trait]
    impl RequestHandler for Tagger {
        async fn handle(
            &self,
            request: &mut Request,
            response: &mut Response,
            next: Next<'_>,
        ) -> Result<(), HandlerError> {
            response.append_body_static(self.tag);
            if self.complete {
                Ok(())
            } else {
                next.run(request, response).await
            }
        }
    }

    #[tokio::test]
    async fn handlers_run_in_order_until_one_completes() {
        let pipeline = Pipeline::builder()
            .add(Tagger { tag: "a", complete: false })
            .add(Tagger { tag: "b", complete: true })
            .add(Tagger { tag: "c", complete: false })
            .build();

        let mut request = Request::new();
        let mut response = Response::new();
        pipeline.dispatch(&mut request, &mut response).await.unwrap();

        assert_eq!(response.take_body().to_vec(), b"ab");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn exhausted_pipeline_answers_not_found() {
        let pipeline = Pipeline::builder().add(Tagger { tag: "x", complete: false }).build();

        let mut request = Request::new();
        let mut response = Response::new();
        pipeline.dispatch(&mut request, &mut response).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn from_fn<'a>(
        _request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            response.append_body_static("from fn");
            Ok(())
        })
    }

    #[tokio::test]
    async fn handler_fn_completes_the_response() {
        let pipeline = Pipeline::builder().add(handler_fn(from_fn)).build();

        let mut request = Request::new();
        let mut response = Response::new();
        pipeline.dispatch(&mut request, &mut response).await.unwrap();

        assert_eq!(response.take_body().to_vec(), b"from fn");
    }
}
