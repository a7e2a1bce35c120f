//! Outgoing HTTP response: a transport handle plus request-scoped
//! serialization capabilities.
//!
//! A [`Response`] is created together with its [`Delivery`] by the listener.
//! The head goes to the delivery side as soon as it is sent; body chunks
//! follow as they are written. Dropping a response before anything was sent
//! leaves the delivery empty, which is how a listener learns that a request
//! went unanswered. Nothing is rolled back: output already sent stays sent.
//!
//! `send` and `json` are not built into the transport. The init middleware
//! attaches a [`Serializer`] to each response at the start of dispatch; a
//! response that never passed through it has no serializer and both calls
//! fail with [`Error::Unsupported`].

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Error;
use crate::settings::{JSON_SPACES, Settings};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the serializer writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// What [`Response::send`] accepts.
#[derive(Clone, Debug)]
pub enum Body {
    Text(String),
    Json(serde_json::Value),
    Binary(Bytes),
}

impl From<&str> for Body {
    fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self { Self::Json(v) }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self { Self::Binary(b) }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self { Self::Binary(b.into()) }
}

// ── Serializer ────────────────────────────────────────────────────────────────

/// The serialization capability attached to one response.
#[derive(Clone, Copy, Debug, Default)]
pub struct Serializer {
    json_spaces: Option<usize>,
}

impl Serializer {
    pub fn from_settings(settings: &Settings) -> Self {
        let json_spaces = settings
            .get(JSON_SPACES)
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n > 0);
        Self { json_spaces }
    }

    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, Error> {
        let Some(spaces) = self.json_spaces else {
            return Ok(serde_json::to_vec(value)?);
        };
        let indent = vec![b' '; spaces];
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut ser)?;
        Ok(out)
    }
}

// ── Delivery ──────────────────────────────────────────────────────────────────

/// Body of a response handed to the listener.
///
/// A response ended in one go carries its whole body with an exact length. A
/// response whose headers were sent before it was ended streams its chunks
/// as they are written, and fails with [`Error::Truncated`] if it is dropped
/// before being ended.
pub type ResponseBody = UnsyncBoxBody<Bytes, Error>;

pub(crate) fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

fn streamed_body(mut chunks: mpsc::UnboundedReceiver<Result<Bytes, Error>>) -> ResponseBody {
    let frames = stream::poll_fn(move |cx| chunks.poll_recv(cx)).map(|chunk| chunk.map(Frame::data));
    StreamBody::new(frames).boxed_unsync()
}

/// The listener's half of a response.
#[derive(Debug)]
pub struct Delivery(oneshot::Receiver<http::Response<ResponseBody>>);

impl Delivery {
    /// Waits for the response head: sent explicitly, by the first write, or
    /// by ending the response.
    ///
    /// Resolves to `None` once every handle to the response is gone without
    /// anything having been sent.
    pub async fn recv(self) -> Option<http::Response<ResponseBody>> {
        self.0.await.ok()
    }

    /// The response, if its head has been sent already.
    pub fn try_recv(&mut self) -> Option<http::Response<ResponseBody>> {
        self.0.try_recv().ok()
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Stage {
    /// Nothing sent yet. Status and headers may still change.
    Open(oneshot::Sender<http::Response<ResponseBody>>),
    /// Head sent, chunks forwarded as they are written.
    Streaming(mpsc::UnboundedSender<Result<Bytes, Error>>),
    Ended,
}

#[derive(Debug)]
struct Transport {
    status: StatusCode,
    headers: HeaderMap,
    stage: Stage,
}

impl Transport {
    /// Builds the head with `body` and hands it to the listener.
    fn send_head(&mut self, head: oneshot::Sender<http::Response<ResponseBody>>, body: ResponseBody) {
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        if head.send(response).is_err() {
            debug!("response head sent after the listener went away");
        }
    }

    /// Sends the head with a streaming body if it has not gone out yet.
    fn start_streaming(&mut self) -> Result<&mpsc::UnboundedSender<Result<Bytes, Error>>, Error> {
        if matches!(self.stage, Stage::Open(_)) {
            let (tx, rx) = mpsc::unbounded_channel();
            if let Stage::Open(head) = std::mem::replace(&mut self.stage, Stage::Streaming(tx)) {
                self.send_head(head, streamed_body(rx));
            }
        }
        match &self.stage {
            Stage::Streaming(tx) => Ok(tx),
            Stage::Open(_) | Stage::Ended => Err(Error::Finished),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Stage::Streaming(tx) = &self.stage {
            let _ = tx.send(Err(Error::Truncated));
        }
    }
}

fn forward(tx: &mpsc::UnboundedSender<Result<Bytes, Error>>, chunk: &[u8]) {
    if !chunk.is_empty() && tx.send(Ok(Bytes::copy_from_slice(chunk))).is_err() {
        debug!("chunk written after the listener went away");
    }
}

/// An outgoing HTTP response.
///
/// Status and headers can change until the head is sent, which happens on
/// [`write_head`](Response::write_head), on the first
/// [`write`](Response::write), or on [`end`](Response::end). Whatever has
/// been written stays written: a response dropped half way keeps the output
/// it already produced, and the listener cuts the connection after it.
///
/// ```rust
/// use strata::{Request, Response};
///
/// async fn hello(_req: Request, mut res: Response) -> Result<(), strata::Error> {
///     res.write_head(http::StatusCode::OK)?;
///     res.write("hello ")?;
///     res.end("world")
/// }
/// ```
#[derive(Debug)]
pub struct Response {
    transport: Transport,
    serializer: Option<Serializer>,
}

impl Response {
    /// Creates a response and the delivery half the listener waits on.
    pub fn new() -> (Self, Delivery) {
        let (tx, rx) = oneshot::channel();
        let transport = Transport {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            stage: Stage::Open(tx),
        };
        (Self { transport, serializer: None }, Delivery(rx))
    }

    pub fn status_code(&self) -> StatusCode { self.transport.status }

    /// Headers not sent yet. Empty once the head has gone out.
    pub fn headers(&self) -> &HeaderMap { &self.transport.headers }

    pub fn headers_sent(&self) -> bool { !matches!(self.transport.stage, Stage::Open(_)) }

    /// Whether the response has been ended.
    pub fn is_finished(&self) -> bool { matches!(self.transport.stage, Stage::Ended) }

    /// Sets the status without sending headers.
    pub fn status(&mut self, status: StatusCode) -> Result<&mut Self, Error> {
        self.ensure_headers_open()?;
        self.transport.status = status;
        Ok(self)
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.ensure_headers_open()?;
        let name = HeaderName::try_from(name).map_err(|e| Error::Http(e.into()))?;
        let value = HeaderValue::try_from(value).map_err(|e| Error::Http(e.into()))?;
        self.transport.headers.insert(name, value);
        Ok(self)
    }

    /// Fixes the status and sends the head. The body streams from here on.
    pub fn write_head(&mut self, status: StatusCode) -> Result<&mut Self, Error> {
        self.status(status)?;
        self.transport.start_streaming()?;
        Ok(self)
    }

    /// Sends a body chunk, sending the head first if needed.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> Result<&mut Self, Error> {
        let tx = self.transport.start_streaming()?;
        forward(tx, chunk.as_ref());
        Ok(self)
    }

    /// Writes a final chunk and completes the response.
    pub fn end(&mut self, chunk: impl AsRef<[u8]>) -> Result<(), Error> {
        match std::mem::replace(&mut self.transport.stage, Stage::Ended) {
            Stage::Open(head) => {
                let body = full_body(Bytes::copy_from_slice(chunk.as_ref()));
                self.transport.send_head(head, body);
            }
            // dropping the sender closes the stream cleanly
            Stage::Streaming(tx) => forward(&tx, chunk.as_ref()),
            Stage::Ended => return Err(Error::Finished),
        }
        Ok(())
    }

    /// Ends the response without a final chunk.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.end(b"")
    }

    /// Attaches the serialization capability for this response only.
    pub fn attach(&mut self, serializer: Serializer) {
        self.serializer = Some(serializer);
    }

    pub fn serializer(&self) -> Option<&Serializer> { self.serializer.as_ref() }

    /// Sends `body` and ends the response.
    ///
    /// JSON values go through [`json`](Response::json); text is sent as
    /// `text/plain; charset=utf-8`; bytes as `application/octet-stream` unless
    /// a content type is already set.
    pub fn send(&mut self, body: impl Into<Body>) -> Result<(), Error> {
        if self.serializer.is_none() {
            return Err(Error::Unsupported("send"));
        }
        match body.into() {
            Body::Json(value) => self.json(&value),
            Body::Text(text) => {
                self.set_header(CONTENT_TYPE, ContentType::Text.as_str())?;
                self.end(text)
            }
            Body::Binary(bytes) => {
                if !self.headers().contains_key(CONTENT_TYPE) {
                    self.set_header(CONTENT_TYPE, ContentType::OctetStream.as_str())?;
                }
                self.end(bytes)
            }
        }
    }

    /// Serializes `value` as JSON and ends the response.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let serializer = self.serializer.ok_or(Error::Unsupported("json"))?;
        let bytes = serializer.to_json(value)?;
        self.set_header(CONTENT_TYPE, ContentType::Json.as_str())?;
        self.end(bytes)
    }

    fn ensure_headers_open(&self) -> Result<(), Error> {
        if self.is_finished() {
            return Err(Error::Finished);
        }
        if self.headers_sent() {
            return Err(Error::HeadersSent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hyper::body::Body as _;
    use serde_json::json;

    use super::*;

    fn attached() -> (Response, Delivery) {
        let (mut res, delivery) = Response::new();
        res.attach(Serializer::default());
        (res, delivery)
    }

    /// Head and complete body of a response that has been ended.
    async fn delivered(delivery: &mut Delivery) -> (http::response::Parts, Bytes) {
        let (parts, body) = delivery.try_recv().expect("head sent").into_parts();
        let body = body.collect().await.expect("response ended").to_bytes();
        (parts, body)
    }

    #[tokio::test]
    async fn end_delivers_status_headers_and_body() {
        let (mut res, mut delivery) = Response::new();
        res.set_header("x-trace", "abc").unwrap();
        res.write_head(StatusCode::CREATED).unwrap();
        res.write("hello ").unwrap();
        res.end("world").unwrap();

        let (parts, body) = delivered(&mut delivery).await;
        assert_eq!(parts.status, StatusCode::CREATED);
        assert_eq!(parts.headers["x-trace"], "abc");
        assert_eq!(body.as_ref(), b"hello world");
    }

    #[test]
    fn ending_in_one_go_sends_an_exact_length() {
        let (mut res, mut delivery) = Response::new();
        res.end("twelve bytes").unwrap();

        let response = delivery.try_recv().unwrap();
        assert_eq!(response.body().size_hint().exact(), Some(12));
    }

    #[test]
    fn the_head_goes_out_before_the_body_is_ended() {
        let (mut res, mut delivery) = Response::new();
        res.status(StatusCode::ACCEPTED).unwrap();
        assert!(delivery.try_recv().is_none());

        res.write("first chunk").unwrap();
        let response = delivery.try_recv().expect("head sent by the first write");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(res.headers_sent());
        assert!(!res.is_finished());
    }

    #[tokio::test]
    async fn dropping_a_started_response_keeps_what_was_written() {
        let (mut res, mut delivery) = Response::new();
        res.write_head(StatusCode::OK).unwrap();
        res.write("partial").unwrap();
        drop(res);

        let mut body = delivery.try_recv().expect("head sent").into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap().as_ref(), b"partial");
        assert!(matches!(body.frame().await, Some(Err(Error::Truncated))));
    }

    #[test]
    fn headers_are_frozen_once_sent() {
        let (mut res, _delivery) = Response::new();
        res.write_head(StatusCode::OK).unwrap();
        assert!(matches!(res.set_header("x-late", "1"), Err(Error::HeadersSent)));
        assert!(matches!(res.status(StatusCode::ACCEPTED), Err(Error::HeadersSent)));
    }

    #[test]
    fn nothing_can_be_written_after_end() {
        let (mut res, _delivery) = Response::new();
        res.finish().unwrap();
        assert!(res.is_finished());
        assert!(matches!(res.write("more"), Err(Error::Finished)));
        assert!(matches!(res.end(""), Err(Error::Finished)));
    }

    #[test]
    fn dropping_an_untouched_response_leaves_the_delivery_empty() {
        let (mut res, mut delivery) = Response::new();
        res.set_header("x-trace", "abc").unwrap();
        drop(res);
        assert!(delivery.try_recv().is_none());
    }

    #[tokio::test]
    async fn send_text_sets_plain_text_content_type() {
        let (mut res, mut delivery) = attached();
        res.send("hello").unwrap();
        let (parts, body) = delivered(&mut delivery).await;
        assert_eq!(parts.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(body.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn send_structured_value_delegates_to_json() {
        let (mut res, mut delivery) = attached();
        res.send(json!({ "id": 1 })).unwrap();
        let (parts, body) = delivered(&mut delivery).await;
        assert_eq!(parts.headers[CONTENT_TYPE], "application/json");
        assert_eq!(body.as_ref(), br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn send_binary_keeps_an_explicit_content_type() {
        let (mut res, mut delivery) = attached();
        res.set_header(CONTENT_TYPE, "image/png").unwrap();
        res.send(vec![0x89, b'P', b'N', b'G']).unwrap();
        let (parts, _body) = delivered(&mut delivery).await;
        assert_eq!(parts.headers[CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn json_honours_configured_indentation() {
        let mut settings = Settings::default();
        settings.set(JSON_SPACES, 2);
        let (mut res, mut delivery) = Response::new();
        res.attach(Serializer::from_settings(&settings));
        res.json(&json!({ "a": 1 })).unwrap();
        let (_parts, body) = delivered(&mut delivery).await;
        assert_eq!(body.as_ref(), b"{\n  \"a\": 1\n}");
    }

    #[test]
    fn capabilities_require_an_attached_serializer() {
        let (mut res, _delivery) = Response::new();
        assert!(matches!(res.send("hi"), Err(Error::Unsupported("send"))));
        assert!(matches!(res.json(&1), Err(Error::Unsupported("json"))));
        assert!(!res.is_finished());
    }
}
