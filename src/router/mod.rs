//! Request routing: map an exact method and path to a handler.
//!
//! The relay exposes a single fixed endpoint, so a route matches only when the
//! whole request target equals its path: `/sns?x=1` and even `/sns?` miss.
//! Anything unmatched gets an empty `404 Not Found`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler stored by the [`Router`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this through the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

impl Route {
    fn matches(&self, request: &Request) -> bool {
        &self.method == request.method()
            && self.path == request.path()
            && request.query_string().is_none()
    }
}

/// Dispatches requests to the first route whose method and path match.
///
/// # Examples
///
/// ```rust,no_run
/// use sns_relay::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.post("/sns", |_ctx| async { Response::new(StatusCode::Ok).body("Message processed") });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a handler for `POST path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: path.to_owned(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the matching handler, or answers `404` with an empty body.
    pub async fn route(&self, request: Request) -> Response {
        let found = self
            .routes
            .iter()
            .find(|r| r.matches(&request));

        match found {
            Some(route) => (route.handler)(Context::new(request)).await,
            None => {
                debug!(
                    method = %request.method(),
                    path = %request.path(),
                    query = request.query_string().unwrap_or(""),
                    "no route"
                );
                Response::new(StatusCode::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn sns_router() -> Router {
        let mut router = Router::new();
        router.post("/sns", |_ctx| async {
            Response::new(StatusCode::Ok).body("Message processed")
        });
        router
    }

    #[test]
    fn starts_empty() {
        assert!(Router::new().is_empty());
        assert_eq!(sns_router().len(), 1);
    }

    #[tokio::test]
    async fn post_to_registered_path() {
        let res = sns_router().route(make_request("POST", "/sns")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_bytes(), b"Message processed");
    }

    #[tokio::test]
    async fn trailing_slash_is_a_different_path() {
        let res = sns_router().route(make_request("POST", "/sns/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn query_string_is_part_of_the_match() {
        for target in ["/sns?x=1", "/sns?"] {
            let res = sns_router().route(make_request("POST", target)).await;
            assert_eq!(res.status(), StatusCode::NotFound);
            assert!(res.body_bytes().is_empty());
        }
    }

    #[tokio::test]
    async fn wrong_method_is_not_found_with_empty_body() {
        let res = sns_router().route(make_request("GET", "/sns")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert!(res.body_bytes().is_empty());
    }

    #[tokio::test]
    async fn other_path_is_not_found() {
        let res = sns_router().route(make_request("POST", "/other")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert!(res.body_bytes().is_empty());
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = sns_router();
        router.post("/sns", |_ctx| async { Response::new(StatusCode::BadRequest) });
        let res = router.route(make_request("POST", "/sns")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
