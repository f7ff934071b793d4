//! One log line per finished request.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::http::middleware::request_id::X_REQUEST_ID;
use crate::observability::metrics;

pub async fn request_log(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(req).await;

    let status = response.status();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        cost = start.elapsed().as_millis() as u64,
        "http request over"
    );
    metrics::record_request(method.as_str(), status.as_u16(), start);
    response
}
