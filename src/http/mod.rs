pub mod handlers;
pub mod subscription;

use crate::server::state::AppState;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

/// Top-level request router. Dispatches on path only; each handler parses
/// its own query string.
pub async fn route(
    req: Request<Incoming>,
    state: AppState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let response = match (method.as_str(), path.as_str()) {
        ("GET", "/check") => handlers::check(req, state, peer_addr).await,
        ("POST", "/cancel") => handlers::cancel(req, state).await,
        ("GET", "/api/status") => handlers::api_status(req, state).await,
        ("GET", "/status/stream") => handlers::status_stream(req, state).await,
        ("GET", "/download") => handlers::download(req, state).await,
        ("GET", "/ipcheck") => handlers::ipcheck().await,
        ("GET", "/metrics") => handlers::metrics(state).await,
        ("GET", "/health") | ("GET", "/healthz") => handlers::health().await,
        _ => handlers::not_found(),
    };

    Ok(response)
}
