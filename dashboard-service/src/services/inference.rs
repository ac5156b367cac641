//! Outbound calls to the inference endpoints.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, HOST};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use service_core::error::AppError;
use service_core::observability::inject_trace_context;
use std::time::Duration;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::models::InferenceBody;

#[derive(Error, Debug)]
pub enum InferenceError {
    /// The endpoint answered with a non-2xx status.
    #[error("Model server error: {status}")]
    Upstream { status: StatusCode, body: String },

    /// No response: connection refused, DNS failure, timeout.
    #[error("Model server unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to decode model server response: {0}")]
    Decode(String),

    #[error("Failed to encode inference request: {0}")]
    Encode(String),

    /// 2xx response that lacks the field the caller records.
    #[error("Model server returned an unexpected response: {0}")]
    ContractViolation(String),
}

impl InferenceError {
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Upstream { .. } => "upstream_error",
            InferenceError::Unreachable(_) => "unreachable",
            InferenceError::Decode(_) => "decode_error",
            InferenceError::Encode(_) => "encode_error",
            InferenceError::ContractViolation(_) => "contract_violation",
        }
    }
}

impl From<InferenceError> for AppError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Upstream { .. } | InferenceError::ContractViolation(_) => {
                AppError::BadGateway(err.to_string())
            }
            InferenceError::Unreachable(_) => {
                AppError::GatewayTimeout("Model server is unreachable".to_string())
            }
            InferenceError::Decode(_) | InferenceError::Encode(_) => {
                AppError::InternalError(anyhow::Error::new(err))
            }
        }
    }
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// POST `payload` to `endpoint` and return the JSON object it answers with.
    async fn invoke(
        &self,
        endpoint: &EndpointConfig,
        payload: &Value,
    ) -> Result<InferenceBody, InferenceError>;
}

/// HTTP/1.1 client that addresses the gateway by URL and routes by `Host`.
#[derive(Clone)]
pub struct HttpInferenceClient {
    client: Client,
}

impl HttpInferenceClient {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .http1_only()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn headers_for(endpoint: &EndpointConfig) -> Result<HeaderMap, InferenceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let host = HeaderValue::from_str(&endpoint.host).map_err(|e| {
            InferenceError::Encode(format!("invalid host header {:?}: {}", endpoint.host, e))
        })?;
        headers.insert(HOST, host);
        inject_trace_context(&mut headers);
        Ok(headers)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn invoke(
        &self,
        endpoint: &EndpointConfig,
        payload: &Value,
    ) -> Result<InferenceBody, InferenceError> {
        let headers = Self::headers_for(endpoint)?;

        tracing::debug!(
            url = %endpoint.url,
            host = %endpoint.host,
            "Sending request to inference endpoint"
        );

        let response = self
            .client
            .post(&endpoint.url)
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %endpoint.url, error = %e, "Inference endpoint unreachable");
                InferenceError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %endpoint.url,
                status = %status,
                body = %body,
                "Inference endpoint returned an error"
            );
            return Err(InferenceError::Upstream { status, body });
        }

        // The client timeout also covers the body, so a server that stalls
        // after its headers fails here rather than in parsing.
        let bytes = response.bytes().await.map_err(|e| {
            tracing::warn!(
                url = %endpoint.url,
                timed_out = e.is_timeout(),
                error = %e,
                "Inference endpoint stopped responding mid-body"
            );
            InferenceError::Unreachable(e.to_string())
        })?;

        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| InferenceError::Decode(e.to_string()))?;

        match body {
            Value::Object(map) => Ok(map),
            other => Err(InferenceError::Decode(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}
