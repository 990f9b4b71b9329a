//! The request-routing handler.
//!
//! [`RoutingHandler`] is a pipeline element (usually the last before the
//! default 404) that dispatches to a sub-handler chosen by method and
//! path. Patterns are case sensitive; `*` matches exactly one segment,
//! `**` matches zero or more trailing segments and is only legal at the
//! end:
//!
//! - `/api/v1/users` matches `/api/v1/users`
//! - `/api/v1/user/*` matches `/api/v1/user/1` and `/api/v1/user/2`
//! - `/api/v1/user/*/logs` matches `/api/v1/user/1/logs`
//! - `/static/**` matches `/static/js/1.js` and `/static/css/1.css`
//!
//! Wildcard captures are published to the sub-handler as [`RouteParams`]
//! in the request extensions. A request nothing matches is forwarded to
//! the next pipeline handler. Registering the same method and pattern
//! twice replaces the earlier handler.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use coral_http::buffer::ByteStr;
use coral_http::handler::{HandlerError, Next, RequestHandler};
use coral_http::protocol::{Request, Response};
use http::Method;
use tracing::trace;

mod pattern;

pub use pattern::RouteError;

use pattern::{PatternTree, parse_pattern};

/// Path parameters captured by the matched pattern, stored in the request
/// extensions for the sub-handler.
#[derive(Debug, Clone, Default)]
pub struct RouteParams {
    captures: Vec<ByteStr>,
    tail: Option<ByteStr>,
}

impl RouteParams {
    /// The segment matched by the n-th `*` of the pattern.
    pub fn get(&self, index: usize) -> Option<&ByteStr> {
        self.captures.get(index)
    }

    pub fn captures(&self) -> &[ByteStr] {
        &self.captures
    }

    /// The trailing path matched by `**`, without its leading slash.
    pub fn tail(&self) -> Option<&ByteStr> {
        self.tail.as_ref()
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

/// Routes requests to sub-handlers by method and path pattern.
#[derive(Default)]
pub struct RoutingHandler {
    methods: HashMap<Method, PatternTree>,
}

impl RoutingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a handler with a method and path pattern. A handler
    /// already registered under the exact same method and pattern is
    /// replaced.
    pub fn route<H: RequestHandler + 'static>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouteError> {
        self.route_shared(method, pattern, Arc::new(handler))
    }

    /// [`RoutingHandler::route`] for an already shared handler.
    pub fn route_shared(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RouteError> {
        let segments = parse_pattern(pattern)?;
        self.methods.entry(method).or_default().insert(&segments, handler);
        Ok(())
    }

    /// Removes the handler registered under the exact method and pattern,
    /// pruning emptied branches. Returns whether something was removed.
    pub fn remove_route(&mut self, method: &Method, pattern: &str) -> bool {
        let Ok(segments) = parse_pattern(pattern) else {
            return false;
        };
        let Some(tree) = self.methods.get_mut(method) else {
            return false;
        };
        let removed = tree.remove(&segments);
        if removed && tree.is_empty() {
            self.methods.remove(method);
        }
        removed
    }

    /// Looks up the handler registered under the exact method and pattern,
    /// without matching.
    pub fn get_route(&self, method: &Method, pattern: &str) -> Option<Arc<dyn RequestHandler>> {
        let segments = parse_pattern(pattern).ok()?;
        self.methods.get(method)?.get(&segments)
    }
}

impl Debug for RoutingHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingHandler").field("methods", &self.methods.len()).finish()
    }
}

#[async_trait]
impl RequestHandler for RoutingHandler {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        let url = request.url().clone();
        let path = match url.find('?') {
            Some(position) => &url.as_str()[..position],
            None => url.as_str(),
        };

        let Some(tree) = self.methods.get(request.method()) else {
            trace!(method = %request.method(), "no routes for method");
            return next.run(request, response).await;
        };
        let Some(matched) = tree.find(path) else {
            trace!(path, "no route matched");
            return next.run(request, response).await;
        };

        let params = RouteParams {
            captures: matched.captures.iter().map(|capture| url.slice_of(capture)).collect(),
            tail: matched.tail.map(|tail| url.slice_of(tail)),
        };
        let handler = Arc::clone(matched.handler);

        request.extensions_mut().insert(params);
        handler.handle(request, response, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coral_http::handler::Pipeline;
    use http::StatusCode;

    /// Echoes the first captured segment, or the tail for `**` routes.
    struct EchoParam;

    #[async_trait]
    impl RequestHandler for EchoParam {
        async fn handle(
            &self,
            request: &mut Request,
            response: &mut Response,
            _next: Next<'_>,
        ) -> Result<(), HandlerError> {
            let params = request.extensions().get::<RouteParams>().cloned().unwrap_or_default();
            if let Some(capture) = params.get(0) {
                response.append_body(capture.clone().into_bytes());
            } else if let Some(tail) = params.tail() {
                response.append_body(tail.clone().into_bytes());
            }
            Ok(())
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl RequestHandler for Fixed {
        async fn handle(
            &self,
            _request: &mut Request,
            response: &mut Response,
            _next: Next<'_>,
        ) -> Result<(), HandlerError> {
            response.append_body_static(self.0);
            Ok(())
        }
    }

    fn request(method: Method, url: &'static str) -> Request {
        let mut request = Request::new();
        request.set_method(method);
        request.set_url(ByteStr::from_static(url));
        request
    }

    async fn dispatch(pipeline: &Pipeline, mut request: Request) -> (StatusCode, Vec<u8>) {
        let mut response = Response::new();
        pipeline.dispatch(&mut request, &mut response).await.unwrap();
        let body = response.take_body().to_vec();
        (response.status(), body)
    }

    fn router() -> RoutingHandler {
        let mut router = RoutingHandler::new();
        router.route(Method::GET, "/hello", Fixed("world")).unwrap();
        router.route(Method::GET, "/api/v1/user/*", EchoParam).unwrap();
        router.route(Method::GET, "/static/**", EchoParam).unwrap();
        router
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let pipeline = Pipeline::builder().add(router()).build();

        let (status, body) = dispatch(&pipeline, request(Method::GET, "/hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"world");

        // same path, wrong method: falls through to the default 404
        let (status, _) = dispatch(&pipeline, request(Method::POST, "/hello")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn captured_segment_reaches_the_sub_handler() {
        let pipeline = Pipeline::builder().add(router()).build();

        let (status, body) = dispatch(&pipeline, request(Method::GET, "/api/v1/user/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"42");

        // one extra segment: no match, forwarded to the default 404
        let (status, _) = dispatch(&pipeline, request(Method::GET, "/api/v1/user/42/logs")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn multi_wildcard_tail_reaches_the_sub_handler() {
        let pipeline = Pipeline::builder().add(router()).build();

        let (_, body) = dispatch(&pipeline, request(Method::GET, "/static/js/app.js")).await;
        assert_eq!(body, b"js/app.js");
    }

    #[tokio::test]
    async fn query_strings_do_not_take_part_in_matching() {
        let pipeline = Pipeline::builder().add(router()).build();

        let (status, body) = dispatch(&pipeline, request(Method::GET, "/hello?a=1&b=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"world");
    }

    #[tokio::test]
    async fn duplicate_registration_replaces_the_handler() {
        let mut router = RoutingHandler::new();
        router.route(Method::GET, "/dup", Fixed("old")).unwrap();
        router.route(Method::GET, "/dup", Fixed("new")).unwrap();

        let pipeline = Pipeline::builder().add(router).build();
        let (_, body) = dispatch(&pipeline, request(Method::GET, "/dup")).await;
        assert_eq!(body, b"new");
    }

    #[test]
    fn remove_and_exact_lookup() {
        let mut router = router();
        assert!(router.get_route(&Method::GET, "/api/v1/user/*").is_some());
        // exact lookup does not match concrete paths
        assert!(router.get_route(&Method::GET, "/api/v1/user/42").is_none());

        assert!(router.remove_route(&Method::GET, "/api/v1/user/*"));
        assert!(router.get_route(&Method::GET, "/api/v1/user/*").is_none());
        assert!(!router.remove_route(&Method::GET, "/api/v1/user/*"));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let mut router = RoutingHandler::new();
        assert!(matches!(
            router.route(Method::GET, "/a/**/b", Fixed("x")),
            Err(RouteError::MultiWildcardNotLast { .. })
        ));
        assert!(matches!(
            router.route(Method::GET, "missing-slash", Fixed("x")),
            Err(RouteError::InvalidPattern { .. })
        ));
    }
}
