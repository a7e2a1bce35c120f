//! Handler trait, type erasure and the [`Next`] continuation.
//!
//! # How handlers are stored
//!
//! Routes and routers hold handlers of *different* types in one `Vec<Layer>`.
//! Each handler is erased behind `dyn ErasedHandler` at registration time:
//!
//! ```text
//! async fn auth(req, res, next) { … }              ← user writes this
//!        ↓ app.get("/", auth)
//! auth.into_boxed_handler()                        ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler { name: "auth", f: auth })    ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req, res, next)  at request time    ← one vtable dispatch
//! ```
//!
//! # Two handler shapes
//!
//! | Shape | Signature |
//! |---|---|
//! | Middleware | `async fn(Request, Response, Next) -> impl IntoOutcome` |
//! | Terminal | `async fn(Request, Response) -> impl IntoOutcome` |
//!
//! `IntoOutcome` is implemented for `()` and `Result<(), E>`. An `Err` is a
//! handler failure: it is reported to the diagnostic sink and traversal stops
//! for that request.
//!
//! Closures must annotate their argument types, because both shapes are
//! candidates until the arity is known:
//!
//! ```rust
//! use strata::{Application, Next, Request, Response};
//!
//! let mut app = Application::new();
//! app.use_middleware(|req: Request, res: Response, next: Next| async move {
//!     next.run(req, res).await;
//! });
//! ```

use std::borrow::Cow;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The error a failing handler hands back to its layer.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<Result<(), BoxError>>;

    /// Display name used in diagnostics.
    fn name(&self) -> &str;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a handler's future resolves to.
pub trait IntoOutcome: Send + 'static {
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation handed to every handler.
///
/// Calling [`run`](Next::run) resumes traversal at the next eligible layer:
/// the next handler of the same route, then the router's remaining layers.
/// `run` consumes `self`, so a handler can advance at most once. Dropping a
/// `Next` without running it ends traversal for this request.
pub struct Next(Box<dyn FnOnce(Request, Response) -> BoxFuture<()> + Send>);

impl Next {
    /// Builds a continuation from a closure.
    ///
    /// The router builds these internally. It is public so handlers can be
    /// driven directly in tests, or wrapped around a nested router.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Request, Response) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Box::new(move |req, res| Box::pin(f(req, res))))
    }

    /// A continuation that does nothing.
    pub fn noop() -> Self {
        Self::new(|_req, _res| async {})
    }

    /// Resumes traversal with this request/response pair.
    pub async fn run(self, req: Request, res: Response) {
        (self.0)(req, res).await;
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler.
///
/// You never implement this yourself: it is satisfied by any function or
/// closure of one of the two shapes listed in the module docs. `Args` is a
/// marker that keeps the two blanket impls apart.
///
/// The trait is sealed so the set of handler shapes stays under the crate's
/// control.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed<Args> {}
}

/// Marker for handlers renamed with [`named`].
#[doc(hidden)]
pub struct Renamed<Args>(std::marker::PhantomData<Args>);

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, O> private::Sealed<(Request, Response, Next)> for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoOutcome,
{
}

impl<F, Fut, O> Handler<(Request, Response, Next)> for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoOutcome,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler { name: display_name::<F>(), f: self })
    }
}

impl<F, Fut, O> private::Sealed<(Request, Response)> for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoOutcome,
{
}

impl<F, Fut, O> Handler<(Request, Response)> for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoOutcome,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        // The terminal shape drops its continuation: it never advances.
        let terminal = move |req: Request, res: Response, _next: Next| (self)(req, res);
        Arc::new(FnHandler { name: display_name::<F>(), f: terminal })
    }
}

impl<H, A> private::Sealed<Renamed<A>> for Named<H> where H: Handler<A> {}

impl<H, A> Handler<Renamed<A>> for Named<H>
where
    H: Handler<A>,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(NamedHandler {
            name: self.name,
            inner: self.handler.into_boxed_handler(),
        })
    }
}

// ── Naming ────────────────────────────────────────────────────────────────────

/// A handler with an explicit display name.
pub struct Named<H> {
    name: Cow<'static, str>,
    handler: H,
}

/// Gives `handler` an explicit name for diagnostics.
///
/// Function items are named after the function already; closures report as
/// `<anonymous>` unless renamed here.
pub fn named<H>(name: impl Into<Cow<'static, str>>, handler: H) -> Named<H> {
    Named { name: name.into(), handler }
}

/// Derives a display name from the handler's type: the last path segment for
/// function items, `<anonymous>` for closures.
pub(crate) fn display_name<F>() -> &'static str {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return "<anonymous>";
    }
    full.rsplit("::").next().unwrap_or(full)
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F, Fut, O> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = O> + Send + 'static,
    O: IntoOutcome,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<Result<(), BoxError>> {
        let fut = (self.f)(req, res, next);
        Box::pin(async move { fut.await.into_outcome() })
    }

    fn name(&self) -> &str {
        self.name
    }
}

struct NamedHandler {
    name: Cow<'static, str>,
    inner: BoxedHandler,
}

impl ErasedHandler for NamedHandler {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture<Result<(), BoxError>> {
        self.inner.call(req, res, next)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Uri};

    use super::*;

    async fn authenticate(req: Request, res: Response, next: Next) {
        next.run(req, res).await;
    }

    fn boxed<H: Handler<A>, A>(handler: H) -> BoxedHandler {
        handler.into_boxed_handler()
    }

    #[test]
    fn function_items_are_named_after_the_function() {
        assert_eq!(boxed(authenticate).name(), "authenticate");
    }

    #[test]
    fn closures_are_anonymous_until_named() {
        let anon = |_req: Request, _res: Response| async {};
        assert_eq!(boxed(anon).name(), "<anonymous>");

        let renamed = named("greeter", |_req: Request, _res: Response| async {});
        assert_eq!(boxed(renamed).name(), "greeter");
    }

    #[tokio::test]
    async fn errors_surface_as_outcomes() {
        let failing = |_req: Request, _res: Response| async { Err::<(), _>("boom") };
        let (res, _delivery) = Response::new();
        let outcome = boxed(failing)
            .call(Request::new(Method::GET, Uri::from_static("/")), res, Next::noop())
            .await;
        assert_eq!(outcome.unwrap_err().to_string(), "boom");
    }
}
