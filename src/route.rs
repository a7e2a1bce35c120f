//! Per-path, per-method handler stacks.
//!
//! A [`Route`] is created by [`Router::route`](crate::Router::route) and owns
//! every handler registered for its path. Handlers for the same method run in
//! registration order, but only through the continuation: each one must call
//! [`Next::run`] for the next to see the request. After the route's last
//! handler, the continuation leaves the route and resumes the router's scan.

use std::collections::HashSet;
use std::sync::Arc;

use http::Method;
use tracing::{debug, trace};

use crate::error::Error;
use crate::handler::{BoxFuture, Handler, Next};
use crate::layer::{Layer, RouteId};
use crate::method::{self, for_each_verb};
use crate::request::Request;
use crate::response::Response;
use crate::router::Table;

#[derive(Clone, Debug)]
pub struct Route {
    path: String,
    stack: Vec<Layer>,
    methods: HashSet<Method>,
}

impl Route {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            stack: Vec::new(),
            methods: HashSet::new(),
        }
    }

    pub fn path(&self) -> &str { &self.path }

    /// Number of handlers registered across all methods.
    pub fn len(&self) -> usize { self.stack.len() }

    pub fn is_empty(&self) -> bool { self.stack.is_empty() }

    /// Methods with at least one explicitly registered handler.
    pub fn methods(&self) -> impl Iterator<Item = &Method> { self.methods.iter() }

    /// Whether a request with `method` would reach a handler on this route.
    pub fn handles_method(&self, method: &Method) -> bool {
        let effective = method::effective(method, self.methods.contains(&Method::HEAD));
        self.stack.iter().any(|layer| layer.handles(&effective))
    }

    /// Appends `handler` to the stack for `method`.
    pub fn on<H, A>(&mut self, method: Method, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        self.methods.insert(method.clone());
        self.stack.push(Layer::for_method(Some(method), handler.into_boxed_handler()));
        self
    }

    /// Like [`on`](Route::on), for a method given as a string token.
    ///
    /// Fails without registering anything if `method` is not a valid token;
    /// the error names the method, the route and the handler's type.
    pub fn try_on<H, A>(&mut self, method: &str, handler: H) -> Result<&mut Self, Error>
    where
        H: Handler<A>,
    {
        let Some(parsed) = method::parse(method) else {
            return Err(Error::InvalidMethod {
                method: method.to_owned(),
                path: self.path.clone(),
                handler: std::any::type_name::<H>(),
            });
        };
        Ok(self.on(parsed, handler))
    }

    /// Appends `handler` for every method.
    pub fn all<H, A>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        self.stack.push(Layer::for_method(None, handler.into_boxed_handler()));
        self
    }

    /// Runs this route's handlers for the request.
    ///
    /// An empty route leaves the request unanswered and does not call `done`.
    /// Otherwise the first handler for the effective method runs; when the
    /// stack has nothing (more) for that method, `done` is called.
    pub(crate) fn dispatch(
        table: Arc<Table>,
        id: RouteId,
        mut req: Request,
        res: Response,
        done: Next,
    ) -> BoxFuture<()> {
        let route = &table.routes[id.0];
        if route.stack.is_empty() {
            debug!(route = %route.path, "route has no handlers, request left as is");
            return Box::pin(async {});
        }

        let method = method::effective(req.method(), route.methods.contains(&Method::HEAD));
        req.route = Some(route.path.clone());
        step(table, id, method, 0, req, res, done)
    }
}

/// Runs the next handler at or after `cursor` that handles `method`.
fn step(
    table: Arc<Table>,
    id: RouteId,
    method: Method,
    cursor: usize,
    req: Request,
    res: Response,
    done: Next,
) -> BoxFuture<()> {
    Box::pin(async move {
        let stack = &table.routes[id.0].stack;
        let Some(offset) = stack[cursor..].iter().position(|layer| layer.handles(&method)) else {
            trace!(%method, path = %req.path(), "route stack exhausted, leaving route");
            return done.run(req, res).await;
        };

        let idx = cursor + offset;
        let resume = Arc::clone(&table);
        let next = Next::new(move |req, res| step(resume, id, method, idx + 1, req, res, done));
        stack[idx].handle_request(req, res, next, &*table.diagnostics).await;
    })
}

macro_rules! route_verbs {
    ($($name:ident => $method:ident,)*) => {
        impl Route {
            $(
                #[doc = concat!("Appends a `", stringify!($method), "` handler.")]
                pub fn $name<H, A>(&mut self, handler: H) -> &mut Self
                where
                    H: Handler<A>,
                {
                    self.on(Method::$method, handler)
                }
            )*
        }
    };
}

for_each_verb!(route_verbs);
