//! Ordered layer stack and request traversal.
//!
//! Registration order is the only priority. Nothing is ranked by
//! specificity: a request walks the stack from the top, and every layer whose
//! path matches gets a turn until one of them stops calling [`Next::run`].
//! Mount-everywhere middleware therefore has to be registered before the
//! routes it is meant to precede.
//!
//! The stack lives behind an `Arc`. Registering through a `Router` that has
//! already been cloned (for example into a running server) copies the stack
//! first, so in-flight requests never observe a half-registered table.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, Next};
use crate::layer::{Layer, MatchOptions, RouteId, Target};
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;

/// Path comparison settings applied to every route the router creates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RouterOptions {
    /// `/Users` and `/users` are different routes.
    pub case_sensitive: bool,
    /// `/users/` and `/users` are different routes.
    pub strict: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { case_sensitive: true, strict: true }
    }
}

/// Shared, read-only state a request walks over.
#[derive(Clone)]
pub(crate) struct Table {
    pub(crate) layers: Vec<Layer>,
    pub(crate) routes: Vec<Route>,
    pub(crate) options: RouterOptions,
    pub(crate) diagnostics: Arc<dyn DiagnosticSink>,
}

/// The ordered stack of middleware and route layers.
///
/// ```rust
/// use strata::{Next, Request, Response, Router};
///
/// async fn log(req: Request, res: Response, next: Next) {
///     println!("{} {}", req.method(), req.path());
///     next.run(req, res).await;
/// }
///
/// async fn hello(_req: Request, mut res: Response) -> Result<(), strata::Error> {
///     res.end("hello")
/// }
///
/// let mut router = Router::new();
/// router.use_middleware(log);
/// router.route("/hello").get(hello);
/// ```
#[derive(Clone)]
pub struct Router {
    table: Arc<Table>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            table: Arc::new(Table {
                layers: Vec::new(),
                routes: Vec::new(),
                options,
                diagnostics: Arc::new(TracingSink),
            }),
        }
    }

    pub fn options(&self) -> RouterOptions { self.table.options }

    /// Number of layers on the stack, middleware and routes alike.
    pub fn len(&self) -> usize { self.table.layers.len() }

    pub fn is_empty(&self) -> bool { self.table.layers.is_empty() }

    /// Routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> { self.table.routes.iter() }

    /// Replaces the sink handler failures are reported to.
    pub fn set_diagnostics(&mut self, sink: impl DiagnosticSink) -> &mut Self {
        self.set_diagnostics_shared(Arc::new(sink))
    }

    pub(crate) fn set_diagnostics_shared(&mut self, sink: Arc<dyn DiagnosticSink>) -> &mut Self {
        Arc::make_mut(&mut self.table).diagnostics = sink;
        self
    }

    /// Creates a new route for `path` and appends it to the stack.
    ///
    /// Every call creates a separate route, even for a path that already has
    /// one. The earlier route is reached first; the later one only sees
    /// requests the earlier one passes on.
    ///
    /// # Panics
    ///
    /// Panics if `path` does not start with `/`. Use
    /// [`try_route`](Router::try_route) to handle that as an error.
    pub fn route(&mut self, path: &str) -> &mut Route {
        self.try_route(path).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_route(&mut self, path: &str) -> Result<&mut Route, Error> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        let table = Arc::make_mut(&mut self.table);
        let id = RouteId(table.routes.len());
        let options = MatchOptions {
            case_sensitive: table.options.case_sensitive,
            strict: table.options.strict,
        };
        table.routes.push(Route::new(path));
        table.layers.push(Layer::route(path, options, id));
        debug!(path, layers = table.layers.len(), "route registered");
        Ok(&mut table.routes[id.0])
    }

    /// Appends middleware that sees every request, whatever its path.
    pub fn use_middleware<H, A>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        let table = Arc::make_mut(&mut self.table);
        table.layers.push(Layer::middleware(handler.into_boxed_handler()));
        self
    }

    /// Walks the stack for one request.
    ///
    /// `out` runs if every matching layer passed the request on; if some
    /// handler stops without calling its continuation, `out` never runs.
    pub fn handle(
        &self,
        req: Request,
        res: Response,
        out: Next,
    ) -> impl Future<Output = ()> + Send + use<> {
        advance(Arc::clone(&self.table), 0, req, res, out)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.table.options)
            .field("layers", &self.table.layers)
            .finish()
    }
}

/// Finds the next layer at or after `cursor` that matches the request path
/// and runs it with a continuation that resumes right after it.
fn advance(table: Arc<Table>, cursor: usize, req: Request, res: Response, out: Next) -> BoxFuture<()> {
    Box::pin(async move {
        let path = req.path();
        let Some(offset) = table.layers[cursor..].iter().position(|layer| layer.matches(path)) else {
            trace!(path = %req.path(), "router stack exhausted");
            return out.run(req, res).await;
        };

        let idx = cursor + offset;
        let layer = &table.layers[idx];
        trace!(index = idx, layer = layer.name(), path = %req.path(), "layer matched");

        let resume = Arc::clone(&table);
        let next = Next::new(move |req, res| advance(resume, idx + 1, req, res, out));
        match layer.target() {
            Target::Route(id) => Route::dispatch(Arc::clone(&table), *id, req, res, next).await,
            Target::Middleware(_) => layer.handle_request(req, res, next, &*table.diagnostics).await,
        }
    })
}
