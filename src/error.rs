//! Unified error type.

use thiserror::Error;

/// The error type returned by strata's fallible operations.
///
/// Two families live here. Registration errors (`InvalidMethod`,
/// `InvalidPath`) surface while the routing table is built. Response errors
/// (`HeadersSent`, `Finished`, `Unsupported`, ...) surface inside handlers,
/// where `?` turns them into a handler failure for the diagnostic sink.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// A handler was registered under a string that is not an HTTP method token.
    #[error("Route.{method}() on `{path}` requires a valid method token (handler: {handler})")]
    InvalidMethod {
        method: String,
        path: String,
        handler: &'static str,
    },

    #[error("invalid route `{0}`: paths must start with '/'")]
    InvalidPath(String),

    #[error("cannot modify headers after they are sent")]
    HeadersSent,

    #[error("write after end")]
    Finished,

    /// A serialization capability was used on a response that never had one
    /// attached (the init middleware did not run for it).
    #[error("response capability `{0}` is not attached")]
    Unsupported(&'static str),

    #[error("request left unanswered")]
    Unanswered,

    /// The response was dropped after its head was sent but before it was
    /// ended. The listener cuts the connection after the output so far.
    #[error("response dropped before it was ended")]
    Truncated,

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
}
