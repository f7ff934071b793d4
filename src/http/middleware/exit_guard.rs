//! Refuse new work once the process is draining.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::http::response::{ApiResponse, ErrCode};
use crate::lifecycle::context::ProcessContext;
use crate::observability::metrics;

pub async fn exit_guard(
    State(ctx): State<Arc<ProcessContext>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if ctx.is_exiting() {
        tracing::warn!(
            method = %req.method(),
            uri = %req.uri(),
            "http recv request when server exit"
        );
        metrics::record_rejected_exiting();
        return ApiResponse::error(ErrCode::Exiting, "server is shutting down")
            .with_status(StatusCode::SERVICE_UNAVAILABLE)
            .into_response();
    }
    next.run(req).await
}
