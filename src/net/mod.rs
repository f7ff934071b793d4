//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig.bind_address
//!     → listener.rs (parse, bind)
//!     → report readiness to the orchestrator
//!     → hand the socket to the HTTP layer
//! ```

pub mod listener;

pub use listener::{bind, ListenerError};
