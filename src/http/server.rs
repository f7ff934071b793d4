//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router (relay + health)
//! - Wire up middleware (panic recovery, request id, logging, exit guard, timeout)
//! - Bind, report readiness, serve until the process stop broadcast fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::config::{GatewayConfig, ListenerConfig};
use crate::http::middleware::{exit_guard, panic_response, request_log, MakeRequestUuidV4};
use crate::http::relay::{healthz, relay_handler, UpstreamClient, UpstreamError};
use crate::lifecycle::context::ProcessContext;
use crate::lifecycle::orchestrator::ListenerContext;
use crate::net::{self, ListenerError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ProcessContext>,
    pub upstream: Arc<UpstreamClient>,
}

pub struct HttpServer {
    router: Router,
    config: ListenerConfig,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, ctx: Arc<ProcessContext>) -> Result<Self, UpstreamError> {
        let upstream = Arc::new(UpstreamClient::from_config(&config.upstream)?);
        let state = AppState { ctx, upstream };
        Ok(Self {
            router: build_router(&config.listener, state),
            config: config.listener.clone(),
        })
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind, report readiness, then serve until `stop` fires.
    pub async fn serve(self, lc: ListenerContext) -> Result<(), ListenerError> {
        let listener = net::bind(&self.config).await?;
        lc.ready.ready();

        let mut stop = lc.stop;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("http server stopping");
            })
            .await
            .map_err(ListenerError::Serve)?;

        tracing::info!("http server stopped");
        Ok(())
    }
}

#[allow(deprecated)]
fn build_router(config: &ListenerConfig, state: AppState) -> Router {
    let ctx = Arc::clone(&state.ctx);
    Router::new()
        .route("/api/relay", post(relay_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(request_log))
                .layer(middleware::from_fn_with_state(ctx, exit_guard))
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
        )
}
