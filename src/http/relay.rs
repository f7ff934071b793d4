//! Prompt relay: forward a JSON body to the completion endpoint.
//!
//! The request and reply schemas belong to the provider; this layer only
//! passes JSON through and wraps the reply in the response envelope.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::response::{ApiResponse, ErrCode};
use crate::http::server::AppState;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream endpoint {endpoint}: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("upstream answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream reply is not JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

pub struct UpstreamClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl UpstreamClient {
    /// Build the client. The bearer key is read from the environment
    /// variable named by `api_key_env`; a missing key is allowed for local
    /// upstreams that need none.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|source| UpstreamError::Endpoint {
            endpoint: config.endpoint.clone(),
            source,
        })?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "upstream api key not set");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn forward(&self, body: &Value) -> Result<Value, UpstreamError> {
        let mut request = self.client.post(self.endpoint.clone()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(UpstreamError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(UpstreamError::Decode)
    }
}

pub async fn relay_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "relay request rejected");
            return ApiResponse::error(ErrCode::RequestParams, rejection.body_text());
        }
    };

    match state.upstream.forward(&body).await {
        Ok(reply) => ApiResponse::ok(reply),
        Err(e) => {
            tracing::error!(error = %e, endpoint = %state.upstream.endpoint(), "relay failed");
            ApiResponse::error(ErrCode::SystemError, e.to_string()).with_status(StatusCode::BAD_GATEWAY)
        }
    }
}

pub async fn healthz(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok(json!({
        "state": state.ctx.state().to_string(),
        "exiting": state.ctx.is_exiting(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_endpoint() {
        let config = UpstreamConfig {
            endpoint: "not a url".into(),
            ..UpstreamConfig::default()
        };
        assert!(matches!(
            UpstreamClient::from_config(&config),
            Err(UpstreamError::Endpoint { .. })
        ));
    }

    #[test]
    fn missing_key_is_allowed() {
        let config = UpstreamConfig {
            api_key_env: "PROMPT_GATEWAY_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::from_config(&config).unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.endpoint().path(), "/v1/chat/completions");
    }
}
