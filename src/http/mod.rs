//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (Axum router, middleware stack)
//!     → middleware/ (recover, request id, log, exit guard, timeout)
//!     → relay.rs (POST /api/relay → upstream completion endpoint)
//!     → response.rs ({code, msg, data} envelope)
//! ```

pub mod middleware;
pub mod relay;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};
