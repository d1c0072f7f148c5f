//! JSON-RPC over HTTP that keeps the response status
//!
//! Gateways in front of RPC nodes answer outages with 502/503 and an HTML
//! or empty body. The status is checked before any decoding so those replies
//! surface as `ProviderError::HTTPError` carrying the status code.

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, JsonRpcError, ProviderError, RpcError};
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Statuses that mean the endpoint is temporarily unable to serve
const UNAVAILABLE_STATUSES: [StatusCode; 2] =
    [StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE];

#[derive(Error, Debug)]
pub enum TransportError {
    /// Request failed, or the endpoint answered with a gateway status
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    JsonRpc(#[from] JsonRpcError),

    #[error("Deserialization Error: {err}. Response: {text}")]
    SerdeJson {
        err: serde_json::Error,
        text: String,
    },
}

impl From<TransportError> for ProviderError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http(e) => ProviderError::HTTPError(e),
            other => ProviderError::JsonRpcClientError(Box::new(other)),
        }
    }
}

impl RpcError for TransportError {
    fn as_error_response(&self) -> Option<&JsonRpcError> {
        match self {
            TransportError::JsonRpc(e) => Some(e),
            _ => None,
        }
    }

    fn as_serde_error(&self) -> Option<&serde_json::Error> {
        match self {
            TransportError::SerdeJson { err, .. } => Some(err),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct Request<'a, T> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: T,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

/// HTTP JSON-RPC client
#[derive(Debug)]
pub struct StatusAwareHttp {
    id: AtomicU64,
    client: Client,
    url: Url,
}

impl StatusAwareHttp {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, Client::new())
    }

    pub fn with_client(url: Url, client: Client) -> Self {
        Self {
            id: AtomicU64::new(1),
            client,
            url,
        }
    }
}

#[async_trait]
impl JsonRpcClient for StatusAwareHttp {
    type Error = TransportError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, TransportError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let payload = Request {
            jsonrpc: "2.0",
            id: self.id.fetch_add(1, Ordering::SeqCst),
            method,
            params,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?;

        if UNAVAILABLE_STATUSES.contains(&response.status()) {
            // The body of a gateway page carries nothing worth decoding
            response.error_for_status_ref()?;
        }

        let body = response.bytes().await?;
        let serde_error = |err| TransportError::SerdeJson {
            err,
            text: String::from_utf8_lossy(&body).to_string(),
        };

        let reply: Reply = serde_json::from_slice(&body).map_err(serde_error)?;
        if let Some(error) = reply.error {
            return Err(error.into());
        }
        serde_json::from_value(reply.result).map_err(serde_error)
    }
}
