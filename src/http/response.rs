//! JSON response envelope.
//!
//! Every API answer is `{"code": <int>, "msg": <string>, "data": <any|null>}`.
//! Application errors travel in `code`; the HTTP status stays 200 except for
//! transport-level refusals (503 while exiting, 502 on upstream failure).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrCode {
    Ok = 0,
    SystemPanic = 1,
    SystemError = 2,
    RequestParams = 3,
    Exiting = 4,
}

impl ErrCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub code: i32,
    pub msg: String,
    pub data: Option<Value>,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            code: ErrCode::Ok.code(),
            msg: "ok".to_string(),
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    pub fn error(code: ErrCode, msg: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            msg: msg.into(),
            data: None,
            status: StatusCode::OK,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
