//! Request middleware.
//!
//! Outermost first: panic recovery → request id → request log → exit guard
//! → timeout → handler.

pub mod exit_guard;
pub mod recover;
pub mod request_id;
pub mod request_log;

pub use exit_guard::exit_guard;
pub use recover::panic_response;
pub use request_id::{MakeRequestUuidV4, X_REQUEST_ID};
pub use request_log::request_log;
