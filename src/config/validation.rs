//! Configuration validation.
//!
//! Serde handles syntax; this checks values. All problems are reported at
//! once rather than stopping at the first.

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::lifecycle::clock::MAX_OFFSET_SECS;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("upstream.endpoint `{0}` is not an http(s) URL")]
    Endpoint(String),

    #[error("logger.max_size and logger.hour_rotate cannot both be 0")]
    NoRotation,

    #[error("logger.log_path must not be empty")]
    EmptyLogPath,

    #[error("lifecycle.pid_file must not be empty")]
    EmptyPidFile,

    #[error("lifecycle.tick_interval_ms must be greater than 0")]
    ZeroTick,

    #[error("lifecycle.sink_capacity must be greater than 0")]
    ZeroSinkCapacity,

    #[error("lifecycle.time_offset_secs {0} is out of range")]
    TimeOffset(i64),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    match Url::parse(&config.upstream.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::Endpoint(config.upstream.endpoint.clone())),
    }

    if config.logger.max_size == 0 && config.logger.hour_rotate == 0 {
        errors.push(ValidationError::NoRotation);
    }
    if config.logger.log_path.trim().is_empty() {
        errors.push(ValidationError::EmptyLogPath);
    }

    if config.lifecycle.pid_file.trim().is_empty() {
        errors.push(ValidationError::EmptyPidFile);
    }
    if config.lifecycle.tick_interval_ms == 0 {
        errors.push(ValidationError::ZeroTick);
    }
    if config.lifecycle.sink_capacity == 0 {
        errors.push(ValidationError::ZeroSinkCapacity);
    }
    if config.lifecycle.time_offset_secs.unsigned_abs() > MAX_OFFSET_SECS.unsigned_abs() {
        errors.push(ValidationError::TimeOffset(config.lifecycle.time_offset_secs));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
