//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Uri};
use http_body_util::BodyExt;
use strata::{Application, Handler, Next, Request, Response, ResponseBody};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Order in which handlers ran.
pub type Trail = Arc<Mutex<Vec<&'static str>>>;

pub fn trail() -> Trail {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn seen(trail: &Trail) -> Vec<&'static str> {
    trail.lock().unwrap().clone()
}

pub fn request(method: Method, path: &'static str) -> Request {
    Request::new(method, Uri::from_static(path))
}

/// Dispatches one request to completion and returns the response, if any
/// handler ended it.
pub async fn send(app: &Application, method: Method, path: &'static str) -> Option<http::Response<Bytes>> {
    let (res, mut delivery) = Response::new();
    app.handle(request(method, path), res).await;
    complete(delivery.try_recv()?).await
}

/// Reads the whole body. `None` if the response was dropped before it was
/// ended.
pub async fn complete(response: http::Response<ResponseBody>) -> Option<http::Response<Bytes>> {
    let (parts, body) = response.into_parts();
    let body = body.collect().await.ok()?.to_bytes();
    Some(http::Response::from_parts(parts, body))
}

/// The head and every chunk that made it out before the body stopped.
pub async fn partial(response: http::Response<ResponseBody>) -> (http::response::Parts, String) {
    let (parts, mut body) = response.into_parts();
    let mut written = String::new();
    while let Some(Ok(frame)) = body.frame().await {
        if let Ok(data) = frame.into_data() {
            written.push_str(std::str::from_utf8(&data).unwrap());
        }
    }
    (parts, written)
}

/// Records `tag`, then passes the request on.
pub fn pass(trail: Trail, tag: &'static str) -> impl Handler<(Request, Response, Next)> {
    move |req: Request, res: Response, next: Next| {
        trail.lock().unwrap().push(tag);
        next.run(req, res)
    }
}

/// Records `tag` and stops without ending the response.
pub fn stop(trail: Trail, tag: &'static str) -> impl Handler<(Request, Response)> {
    move |_req: Request, _res: Response| {
        trail.lock().unwrap().push(tag);
        std::future::ready(())
    }
}

/// Records `tag`, then ends the response with `tag` as its body.
pub fn finish(trail: Trail, tag: &'static str) -> impl Handler<(Request, Response)> {
    move |_req: Request, mut res: Response| {
        trail.lock().unwrap().push(tag);
        std::future::ready(res.end(tag))
    }
}

pub fn body(response: &http::Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

/// Writes a raw HTTP/1.1 request and reads until the server closes.
pub async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    };
    tokio::time::timeout(Duration::from_secs(5), exchange)
        .await
        .expect("server did not close the connection")
}
