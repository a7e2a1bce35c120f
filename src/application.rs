//! The registration surface and per-request entry point.

use std::future::Future;
use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::Error;
use crate::handler::{Handler, Next, named};
use crate::method::for_each_verb;
use crate::middleware;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::router::{Router, RouterOptions};
use crate::settings::{CASE_SENSITIVE_ROUTING, STRICT_ROUTING, Settings};

/// An application: settings plus a lazily created [`Router`].
///
/// The router comes into existence on the first registration, configured
/// from the routing settings at that moment, with the [`init`] middleware as
/// its first layer. Change routing settings before registering anything.
///
/// [`init`]: crate::middleware::init
///
/// ```rust
/// use strata::{Application, Next, Request, Response};
///
/// async fn first(req: Request, res: Response, next: Next) {
///     next.run(req, res).await;
/// }
///
/// async fn second(_req: Request, mut res: Response) -> Result<(), strata::Error> {
///     res.send("from the second handler")
/// }
///
/// let mut app = Application::new();
/// app.get("/", first).get("/", second);
/// ```
pub struct Application {
    router: Option<Router>,
    settings: Arc<Settings>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Application {
    pub fn new() -> Self {
        Self {
            router: None,
            settings: Arc::new(Settings::defaults()),
            diagnostics: Arc::new(TracingSink),
        }
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.settings).set(name, value);
        self
    }

    pub fn setting(&self, name: &str) -> Option<&Value> { self.settings.get(name) }

    pub fn enable(&mut self, name: impl Into<String>) -> &mut Self { self.set(name, true) }

    pub fn disable(&mut self, name: impl Into<String>) -> &mut Self { self.set(name, false) }

    pub fn enabled(&self, name: &str) -> bool { self.settings.enabled(name) }

    pub fn disabled(&self, name: &str) -> bool { self.settings.disabled(name) }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Replaces the sink handler failures are reported to.
    pub fn diagnostics(&mut self, sink: impl DiagnosticSink) -> &mut Self {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(sink);
        if let Some(router) = &mut self.router {
            router.set_diagnostics_shared(Arc::clone(&sink));
        }
        self.diagnostics = sink;
        self
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// The router, once anything has been registered.
    pub fn router(&self) -> Option<&Router> { self.router.as_ref() }

    fn lazy_router(&mut self) -> &mut Router {
        let settings = &self.settings;
        let diagnostics = &self.diagnostics;
        self.router.get_or_insert_with(|| {
            let mut router = Router::with_options(RouterOptions {
                case_sensitive: settings.enabled(CASE_SENSITIVE_ROUTING),
                strict: settings.enabled(STRICT_ROUTING),
            });
            router
                .set_diagnostics_shared(Arc::clone(diagnostics))
                .use_middleware(named("init", middleware::init));
            router
        })
    }

    /// Creates a new route for `path`; chain method registrations onto it.
    ///
    /// # Panics
    ///
    /// Panics if `path` does not start with `/`.
    pub fn route(&mut self, path: &str) -> &mut Route {
        self.lazy_router().route(path)
    }

    pub fn try_route(&mut self, path: &str) -> Result<&mut Route, Error> {
        self.lazy_router().try_route(path)
    }

    /// Appends middleware that sees every request, whatever its path.
    pub fn use_middleware<H, A>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        self.lazy_router().use_middleware(handler);
        self
    }

    /// Registers `handler` for `method` on a new route for `path`.
    pub fn on<H, A>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        self.route(path).on(method, handler);
        self
    }

    /// Registers `handler` for every method on a new route for `path`.
    pub fn all<H, A>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<A>,
    {
        self.route(path).all(handler);
        self
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Runs one request through the application.
    ///
    /// This is what a listener calls once per request. The returned future
    /// resolves when traversal stops, which is not necessarily when the
    /// response was ended: watch the [`Delivery`](crate::Delivery) for that.
    pub fn handle(&self, mut req: Request, res: Response) -> impl Future<Output = ()> + Send + use<> {
        req.settings = Some(Arc::clone(&self.settings));
        let router = self.router.clone();
        async move {
            match router {
                Some(router) => router.handle(req, res, Next::new(exhausted)).await,
                None => exhausted(req, res).await,
            }
        }
    }
}

impl Default for Application {
    fn default() -> Self { Self::new() }
}

/// Terminal continuation: nothing left to try. The response stays as the
/// last handler left it.
async fn exhausted(req: Request, res: Response) {
    debug!(
        method = %req.method(),
        path = %req.path(),
        finished = res.is_finished(),
        "no more layers for request"
    );
}

macro_rules! application_verbs {
    ($($name:ident => $method:ident,)*) => {
        impl Application {
            $(
                #[doc = concat!("Registers a `", stringify!($method), "` handler on a new route for `path`.")]
                pub fn $name<H, A>(&mut self, path: &str, handler: H) -> &mut Self
                where
                    H: Handler<A>,
                {
                    self.on(Method::$method, path, handler)
                }
            )*
        }
    };
}

for_each_verb!(application_verbs);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::JSON_SPACES;

    async fn noop(_req: Request, _res: Response) {}

    #[test]
    fn router_is_created_on_first_registration() {
        let mut app = Application::new();
        assert!(app.router().is_none());

        app.get("/", noop);
        let router = app.router().expect("router created");
        // init layer + the route
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn routing_settings_shape_the_router() {
        let mut app = Application::new();
        app.disable(CASE_SENSITIVE_ROUTING).disable(STRICT_ROUTING);
        app.post("/items", noop);

        let options = app.router().unwrap().options();
        assert!(!options.case_sensitive);
        assert!(!options.strict);
    }

    #[test]
    fn settings_round_trip() {
        let mut app = Application::new();
        app.set(JSON_SPACES, 4).set("title", "My Site");
        assert_eq!(app.setting(JSON_SPACES), Some(&Value::from(4)));
        assert!(app.enabled("title"));
        assert!(app.disabled("missing"));
    }
}
