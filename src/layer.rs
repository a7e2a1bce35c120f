//! A single entry in a router or route stack.
//!
//! A layer is either plain middleware (a handler) or a reference to a
//! [`Route`](crate::Route) owned by the same router. Route layers hold a
//! [`RouteId`] rather than the route itself: the router's stack owns layers
//! and routes side by side.

use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;
use http::Method;
use tracing::trace;

use crate::diagnostics::{DiagnosticSink, Failure, HandlerFailure};
use crate::handler::{BoxedHandler, Next};
use crate::request::Request;
use crate::response::Response;

/// Index of a route in its router's route table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RouteId(pub(crate) usize);

/// How a route layer compares its path with a request path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct MatchOptions {
    pub(crate) case_sensitive: bool,
    pub(crate) strict: bool,
}

impl MatchOptions {
    /// Exact-end comparison. Non-strict ignores one trailing slash on either
    /// side; case-insensitive compares ASCII case-folded.
    fn path_eq(self, pattern: &str, path: &str) -> bool {
        let (pattern, path) = if self.strict {
            (pattern, path)
        } else {
            (trim_trailing_slash(pattern), trim_trailing_slash(path))
        };
        if self.case_sensitive {
            pattern == path
        } else {
            pattern.eq_ignore_ascii_case(path)
        }
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self { case_sensitive: true, strict: true }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

#[derive(Clone)]
pub(crate) enum Target {
    Middleware(BoxedHandler),
    Route(RouteId),
}

#[derive(Clone)]
pub(crate) struct Layer {
    path: String,
    options: MatchOptions,
    target: Target,
    /// Set on layers inside a route's stack; `None` there means every method.
    method: Option<Method>,
}

impl Layer {
    /// Mount-everywhere middleware.
    pub(crate) fn middleware(handler: BoxedHandler) -> Self {
        Self {
            path: "/".to_owned(),
            options: MatchOptions::default(),
            target: Target::Middleware(handler),
            method: None,
        }
    }

    /// A router entry that dispatches to route `id`, anchored at `path`.
    pub(crate) fn route(path: &str, options: MatchOptions, id: RouteId) -> Self {
        Self {
            path: path.to_owned(),
            options,
            target: Target::Route(id),
            method: None,
        }
    }

    /// An entry in a route's own stack. Route-local, so bound to `/`.
    pub(crate) fn for_method(method: Option<Method>, handler: BoxedHandler) -> Self {
        Self { method, ..Self::middleware(handler) }
    }

    pub(crate) fn target(&self) -> &Target { &self.target }

    /// Whether this layer should see a request for `path`.
    ///
    /// Middleware bound to `/` sees everything. Route layers require the
    /// whole path to match.
    pub(crate) fn matches(&self, path: &str) -> bool {
        match self.target {
            Target::Middleware(_) if self.path == "/" => true,
            _ => self.options.path_eq(&self.path, path),
        }
    }

    /// Whether this route-stack layer handles `method`.
    pub(crate) fn handles(&self, method: &Method) -> bool {
        self.method.as_ref().is_none_or(|m| m == method)
    }

    pub(crate) fn name(&self) -> &str {
        match &self.target {
            Target::Middleware(handler) => handler.name(),
            Target::Route(_) => "route",
        }
    }

    /// Runs the wrapped handler. Failures stop here.
    ///
    /// An `Err` outcome or a panic, whether raised while the handler builds
    /// its future or while it is polled, is reported to `sink` once. The
    /// continuation is not invoked on the handler's behalf.
    pub(crate) async fn handle_request(
        &self,
        req: Request,
        res: Response,
        next: Next,
        sink: &dyn DiagnosticSink,
    ) {
        let Target::Middleware(handler) = &self.target else {
            return;
        };
        let method = req.method().clone();
        let path = req.path().to_owned();
        trace!(handler = handler.name(), %method, %path, "invoking handler");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(req, res, next))) {
            Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Failure::Error(e.into())),
                Err(payload) => Err(Failure::from_panic(payload)),
            },
            Err(payload) => Err(Failure::from_panic(payload)),
        };

        if let Err(cause) = outcome {
            sink.report(&HandlerFailure {
                handler: handler.name().to_owned(),
                method,
                path,
                cause,
            });
        }
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("path", &self.path)
            .field("name", &self.name())
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::Uri;

    use super::*;
    use crate::diagnostics::Recorder;
    use crate::handler::Handler;

    fn layer<H: Handler<A>, A>(handler: H) -> Layer {
        Layer::middleware(handler.into_boxed_handler())
    }

    fn request(path: &'static str) -> Request {
        Request::new(Method::GET, Uri::from_static(path))
    }

    #[test]
    fn root_middleware_matches_every_path() {
        let mw = layer(|_req: Request, _res: Response| async {});
        assert!(mw.matches("/"));
        assert!(mw.matches("/deeply/nested"));
    }

    #[test]
    fn route_layers_match_the_exact_path() {
        let exact = Layer::route("/users", MatchOptions::default(), RouteId(0));
        assert!(exact.matches("/users"));
        assert!(!exact.matches("/users/"));
        assert!(!exact.matches("/Users"));
        assert!(!exact.matches("/users/42"));
    }

    #[test]
    fn relaxed_options_fold_case_and_trailing_slash() {
        let options = MatchOptions { case_sensitive: false, strict: false };
        let relaxed = Layer::route("/users", options, RouteId(0));
        assert!(relaxed.matches("/USERS/"));
        assert!(!relaxed.matches("/users/42"));

        let root = Layer::route("/", options, RouteId(0));
        assert!(root.matches("/"));
        assert!(!root.matches("/users"));
    }

    #[tokio::test]
    async fn errors_are_reported_and_not_propagated() {
        let recorder = Recorder::new();
        let failing = layer(|_req: Request, _res: Response| async {
            Err::<(), _>(crate::Error::Unanswered)
        });

        let (res, _delivery) = Response::new();
        failing.handle_request(request("/x"), res, Next::noop(), &recorder).await;

        let failures = recorder.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, "/x");
        assert_eq!(failures[0].handler, "<anonymous>");
    }

    #[tokio::test]
    async fn panics_are_caught_whether_sync_or_async() {
        fn explode(_req: Request, _res: Response) -> std::future::Ready<()> {
            panic!("before the future exists")
        }
        let recorder = Recorder::new();
        let eager = layer(explode);
        let lazy = layer(|_req: Request, _res: Response| async {
            if true {
                panic!("while polling")
            }
        });

        let (res, _d1) = Response::new();
        eager.handle_request(request("/"), res, Next::noop(), &recorder).await;
        let (res, _d2) = Response::new();
        lazy.handle_request(request("/"), res, Next::noop(), &recorder).await;

        let messages: Vec<_> = recorder.failures().iter().map(|f| f.cause.to_string()).collect();
        assert_eq!(
            messages,
            ["panicked: before the future exists", "panicked: while polling"]
        );
    }

    #[tokio::test]
    async fn a_failed_handler_does_not_advance() {
        let recorder = Recorder::new();
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
        let next = Next::new(move |_req, _res| async move {
            let _ = tx.send(());
        });
        let failing = layer(|_req: Request, _res: Response, _next: Next| async {
            Err::<(), _>("nope")
        });

        let (res, _delivery) = Response::new();
        failing.handle_request(request("/"), res, next, &recorder).await;

        assert_eq!(recorder.len(), 1);
        assert!(rx.try_recv().is_err());
    }
}
