//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! tracing events
//!     → logging.rs (subscriber, level filter, panic hook)
//!     → writer.rs (rotating segment, one mutex)
//!     → {log_path}/{YYYYMMDDHH}[_{millis}].log
//!
//! Daily at local midnight:
//!     retention.rs → compress aged segments → cap backups → clean_err.log
//!
//! Maintenance tick / shutdown:
//!     flush.rs → flush every registered writer
//! ```
//!
//! # Design Decisions
//! - A formatted event is one write call and never straddles segments
//! - Retention never touches the live segment
//! - Metrics are no-ops unless the Prometheus exporter is enabled

pub mod flush;
pub mod logging;
pub mod metrics;
pub mod retention;
pub mod segment;
pub mod writer;

pub use flush::FlushRegistry;
pub use writer::{LogSink, RotatingFileWriter};
