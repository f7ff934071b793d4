//! Panic-to-response conversion for `CatchPanicLayer`.
//!
//! The panic hook has already logged location and backtrace; this only
//! shapes the answer.

use axum::response::{IntoResponse, Response};
use std::any::Any;

use crate::http::response::{ApiResponse, ErrCode};
use crate::lifecycle::supervise::panic_message;

pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = %panic_message(err.as_ref()), "http request panic");
    ApiResponse::error(ErrCode::SystemPanic, "server internal panic").into_response()
}
