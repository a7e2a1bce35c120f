//! Built-in middleware.
//!
//! - [`init`]: attaches the response serialization capability. An
//!   [`Application`](crate::Application) installs it as the first layer of
//!   its router; a bare [`Router`](crate::Router) needs it registered by hand
//!   before handlers call `send` or `json`.
//! - [`trace`]: a span per request with method and path, plus the time the
//!   rest of the stack took.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::error::Error;
use crate::handler::Next;
use crate::request::Request;
use crate::response::{Response, Serializer};
use crate::settings::{Settings, X_POWERED_BY};

/// Prepares the response for this request only, then passes it on.
///
/// The serializer is built from the settings of the application handling the
/// request (plain defaults when there is none) and lives on this response
/// alone, so concurrent requests never share capability state.
pub async fn init(req: Request, mut res: Response, next: Next) -> Result<(), Error> {
    let defaults;
    let settings = match req.settings() {
        Some(settings) => settings,
        None => {
            defaults = Settings::default();
            &defaults
        }
    };

    if settings.enabled(X_POWERED_BY) {
        res.set_header("x-powered-by", "strata")?;
    }
    res.attach(Serializer::from_settings(settings));

    next.run(req, res).await;
    Ok(())
}

/// Wraps the rest of the stack in a `request` span.
pub async fn trace(req: Request, res: Response, next: Next) {
    let span = info_span!("request", method = %req.method(), path = %req.path());
    let started = Instant::now();

    next.run(req, res).instrument(span.clone()).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    span.in_scope(|| info!(elapsed_ms, "stack finished"));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{Method, Uri};

    use super::*;

    #[tokio::test]
    async fn init_attaches_a_serializer_and_advances() {
        let mut settings = Settings::defaults();
        settings.set(X_POWERED_BY, true);
        let mut req = Request::new(Method::GET, Uri::from_static("/"));
        req.settings = Some(Arc::new(settings));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let next = Next::new(move |_req, res: Response| async move {
            let _ = tx.send((res.serializer().is_some(), res.headers().clone()));
        });
        let (res, _delivery) = Response::new();
        init(req, res, next).await.unwrap();

        let (attached, headers) = rx.await.unwrap();
        assert!(attached);
        assert_eq!(headers["x-powered-by"], "strata");
    }

    #[tokio::test]
    async fn init_without_an_application_skips_the_banner() {
        let req = Request::new(Method::GET, Uri::from_static("/"));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let next = Next::new(move |_req, res: Response| async move {
            let _ = tx.send(res.headers().contains_key("x-powered-by"));
        });
        let (res, _delivery) = Response::new();
        init(req, res, next).await.unwrap();

        assert!(!rx.await.unwrap());
    }
}
