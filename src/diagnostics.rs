//! Where handler failures go.
//!
//! A handler that returns `Err` or panics is stopped at its layer. The
//! failure is reported to the router's [`DiagnosticSink`] exactly once and
//! dispatch carries on as if the handler had returned normally: nothing
//! advances on its behalf, and whatever it already wrote to the response
//! stays written.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use http::Method;
use tracing::error;

/// Why a handler invocation failed.
#[derive(Clone, Debug)]
pub enum Failure {
    Error(Arc<dyn StdError + Send + Sync + 'static>),
    Panic(String),
}

impl Failure {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map_or_else(|| "Box<dyn Any>".to_owned(), |s| (*s).to_owned()),
        };
        Self::Panic(message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// One failed handler invocation.
#[derive(Clone, Debug)]
pub struct HandlerFailure {
    /// Display name of the failing handler.
    pub handler: String,
    pub method: Method,
    pub path: String,
    pub cause: Failure,
}

/// Receives handler failures. Shared by every in-flight request.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn report(&self, failure: &HandlerFailure);
}

/// The default sink: one `error` event per failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, failure: &HandlerFailure) {
        error!(
            handler = %failure.handler,
            method = %failure.method,
            path = %failure.path,
            "handler failed: {}", failure.cause
        );
    }
}

/// Keeps every reported failure in memory. Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    failures: Arc<Mutex<Vec<HandlerFailure>>>,
}

impl Recorder {
    pub fn new() -> Self { Self::default() }

    pub fn failures(&self) -> Vec<HandlerFailure> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl DiagnosticSink for Recorder {
    fn report(&self, failure: &HandlerFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let owned = Failure::from_panic(Box::new(String::from("owned")));
        let borrowed = Failure::from_panic(Box::new("borrowed"));
        let opaque = Failure::from_panic(Box::new(42_u8));

        assert_eq!(owned.to_string(), "panicked: owned");
        assert_eq!(borrowed.to_string(), "panicked: borrowed");
        assert_eq!(opaque.to_string(), "panicked: Box<dyn Any>");
    }

    #[test]
    fn recorder_clones_share_one_log() {
        let recorder = Recorder::new();
        let sink: Arc<dyn DiagnosticSink> = Arc::new(recorder.clone());
        sink.report(&HandlerFailure {
            handler: "auth".into(),
            method: Method::GET,
            path: "/".into(),
            cause: Failure::Panic("boom".into()),
        });
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.failures()[0].handler, "auth");
    }
}
