//! HTTP listener and graceful shutdown.
//!
//! The listener owns everything the dispatch engine does not: sockets,
//! HTTP/1 and HTTP/2 framing, body collection. Per request it builds a
//! [`Request`] and a [`Response`], hands both to
//! [`Application::handle`](crate::Application::handle) on its own task, and
//! waits for the response to be ended.
//!
//! The response head goes out as soon as a handler sends it and body chunks
//! follow as they are written. A request nobody sends anything for is not
//! answered: once the last handle to its response is dropped, the connection
//! is closed without a response and a warning is logged. A response dropped
//! half way keeps its partial output, then the connection is cut. There is no
//! timeout: a handler that keeps the response alive keeps the client waiting.
//!
//! Request bodies are read in full before dispatch, up to the
//! [`BODY_LIMIT`](crate::settings::BODY_LIMIT) setting. Larger bodies are
//! answered with `413 Payload Too Large` without running any handler.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection run to completion, then returns from [`Server::serve`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::application::Application;
use crate::error::Error;
use crate::handler::BoxError;
use crate::request::Request;
use crate::response::{ContentType, Response, ResponseBody, full_body};

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use strata::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr }
    }

    /// Binds, then serves `app` until SIGTERM or Ctrl-C and a full drain.
    pub async fn serve(self, app: Application) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, app, shutdown_signal()).await
    }
}

/// Serves `app` on an already bound listener until `shutdown` resolves, then
/// waits for in-flight connections to finish.
pub async fn serve_listener(
    listener: TcpListener,
    app: Application,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let app = Arc::new(app);
    info!(addr = %listener.local_addr()?, "strata listening");

    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { dispatch(app, req, remote_addr).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        warn!(peer = %remote_addr, "connection closed: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("strata stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the application and streams its response.
///
/// Returning an error makes hyper drop the connection without writing a
/// response, which is what an unanswered request looks like on the wire. A
/// response dropped after its head went out ends its body with an error,
/// which cuts the connection after the bytes already written.
async fn dispatch(
    app: Arc<Application>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<ResponseBody>, Error> {
    let (parts, body) = req.into_parts();
    let limit = app.settings().body_limit();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(peer = %remote_addr, method = %parts.method, path = %parts.uri.path(), limit, "request body too large");
            return Ok(payload_too_large(limit));
        }
        Err(e) => return Err(downcast_hyper(e)),
    };
    let req = Request::from_parts(parts, body);
    let (method, path) = (req.method().clone(), req.path().to_owned());

    let (res, delivery) = Response::new();
    tokio::spawn(app.handle(req, res));

    match delivery.recv().await {
        Some(response) => Ok(response),
        None => {
            warn!(peer = %remote_addr, %method, %path, "request left unanswered");
            Err(Error::Unanswered)
        }
    }
}

fn payload_too_large(limit: usize) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(full_body(Error::BodyTooLarge(limit).to_string()));
    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(ContentType::Text.as_str()));
    response
}

/// `Limited` boxes the inner body's error; recover the hyper error from it.
fn downcast_hyper(e: BoxError) -> Error {
    match e.downcast::<hyper::Error>() {
        Ok(e) => Error::Hyper(*e),
        Err(e) => Error::Io(std::io::Error::other(e)),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C only, off Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
