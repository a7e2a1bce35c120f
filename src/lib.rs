//! # strata
//!
//! Layered request dispatch for hyper services. An application is an ordered
//! stack of layers; each request walks the stack top to bottom, and every
//! handler decides whether to end the response or pass the request on.
//!
//! ## The model
//!
//! - **Middleware** registered with `use_middleware` sees every request.
//! - **Routes** match one exact path and hold handlers per HTTP method.
//! - **Order is priority.** Nothing is ranked by specificity. A layer runs
//!   only if every matching layer above it called its continuation.
//! - **Next** is the continuation. `next.run(req, res).await` moves on to the
//!   next handler of the same route, then to the rest of the stack.
//! - **Failures stay put.** A handler that errors or panics is reported to
//!   the diagnostic sink; the request is not passed on for it.
//! - **Unanswered is allowed.** If no handler ends the response, the request
//!   simply has no response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use strata::{Application, Error, Next, Request, Response, Server};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Application::new();
//!     app.use_middleware(strata::middleware::trace)
//!         .get("/", greet)
//!         .get("/", fallback)
//!         .get("/users", list_users);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn greet(req: Request, res: Response, next: Next) {
//!     if req.query().is_none() {
//!         return next.run(req, res).await;
//!     }
//!     let mut res = res;
//!     let _ = res.send("hello with a query");
//! }
//!
//! async fn fallback(_req: Request, mut res: Response) -> Result<(), Error> {
//!     res.send("hello")
//! }
//!
//! async fn list_users(_req: Request, mut res: Response) -> Result<(), Error> {
//!     res.json(&json!([{ "id": 1, "name": "alice" }]))
//! }
//! ```

mod application;
mod error;
mod handler;
mod layer;
mod method;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod diagnostics;
pub mod middleware;
pub mod settings;

pub use application::Application;
pub use error::Error;
pub use handler::{BoxError, Handler, IntoOutcome, Named, Next, named};
pub use request::Request;
pub use response::{Body, ContentType, Delivery, Response, ResponseBody, Serializer};
pub use route::Route;
pub use router::{Router, RouterOptions};
pub use server::{Server, serve_listener};
pub use settings::Settings;
