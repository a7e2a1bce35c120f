//! Two handlers chained on one path, a POST route and a JSON endpoint.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl -X POST http://localhost:3000/post
//!   curl http://localhost:3000/users
//!   curl http://localhost:3000/nowhere   # no handler ends it: connection closed

use http::StatusCode;
use serde_json::json;
use strata::settings::JSON_SPACES;
use strata::{Application, Error, Next, Request, Response, Server};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = Application::new();
    app.set(JSON_SPACES, 2)
        .use_middleware(strata::middleware::trace)
        .get("/", announce)
        .get("/", respond)
        .post("/post", post)
        .get("/users", users);

    if let Err(e) = Server::bind("0.0.0.0:3000").serve(app).await {
        eprintln!("server error: {e}");
    }
}

// GET / (first match): looks, then hands over to the next matching handler.
async fn announce(req: Request, res: Response, next: Next) {
    info!(path = %req.path(), "first handler for /");
    next.run(req, res).await;
}

// GET / (second match)
async fn respond(_req: Request, mut res: Response) -> Result<(), Error> {
    res.write_head(StatusCode::OK)?;
    res.write("Response from second matching route")?;
    res.finish()
}

// POST /post
async fn post(_req: Request, mut res: Response) -> Result<(), Error> {
    res.write_head(StatusCode::OK)?;
    res.end("Data from post :)")
}

// GET /users
async fn users(_req: Request, mut res: Response) -> Result<(), Error> {
    res.json(&json!([
        { "id": 1, "name": "alice" },
        { "id": 2, "name": "bob" },
    ]))
}
