//! Incoming HTTP request type.

use std::sync::Arc;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri, Version};

use crate::settings::Settings;

/// An incoming HTTP request.
///
/// Owned by whichever handler is currently running and passed along through
/// [`Next::run`](crate::Next::run). Handlers that want to leave data for later
/// handlers put it in [`extensions_mut`](Request::extensions_mut).
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    extensions: Extensions,
    pub(crate) route: Option<String>,
    pub(crate) settings: Option<Arc<Settings>>,
}

impl Request {
    /// A bodiless request, mostly useful for driving an application directly.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
            route: None,
            settings: None,
        }
    }

    /// Builds a request from the parts a listener already parsed.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            extensions: parts.extensions,
            route: None,
            settings: None,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// The pathname routing matches against; the query string is not part of it.
    pub fn path(&self) -> &str { self.uri.path() }

    pub fn query(&self) -> Option<&str> { self.uri.query() }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path of the route currently dispatching this request, if any.
    pub fn route_path(&self) -> Option<&str> { self.route.as_deref() }

    /// Settings of the application handling this request.
    pub fn settings(&self) -> Option<&Settings> { self.settings.as_deref() }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}
