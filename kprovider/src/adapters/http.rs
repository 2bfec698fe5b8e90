//! Streaming HTTP transport trait and reqwest-based implementation.

use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    ByteStream, ProviderError, ProviderFuture, ProviderId, ProviderOperationHooks, RetryPolicy,
    retry_connect,
};

/// A fully framed POST request whose response body is streamed back.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpStreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

pub trait StreamingTransport: Send + Sync + std::fmt::Debug {
    /// Sends the request and resolves once response headers arrive.
    ///
    /// A non-success status is an error; the body is only streamed on success.
    fn open<'a>(
        &'a self,
        request: HttpStreamRequest,
    ) -> ProviderFuture<'a, Result<ByteStream<'a>, ProviderError>>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn parse_error(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| format!("request failed with status {status}: {}", body.trim()));

        ProviderError::from_status(status.as_u16(), message)
    }
}

impl StreamingTransport for ReqwestTransport {
    fn open<'a>(
        &'a self,
        request: HttpStreamRequest,
    ) -> ProviderFuture<'a, Result<ByteStream<'a>, ProviderError>> {
        Box::pin(async move {
            let mut builder = self.client.post(&request.url).json(&request.body);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    ProviderError::timeout(err.to_string())
                } else {
                    ProviderError::transport(err.to_string())
                }
            })?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let body = response.bytes_stream().map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|err| ProviderError::transport(err.to_string()))
            });

            Ok(Box::pin(body) as ByteStream<'a>)
        })
    }
}

/// Opens a stream under `policy`, racing the attempts against `cancel`.
pub async fn open_with_retry<'a>(
    provider: ProviderId,
    transport: &'a dyn StreamingTransport,
    request: HttpStreamRequest,
    policy: &RetryPolicy,
    hooks: &dyn ProviderOperationHooks,
    cancel: &CancellationToken,
) -> Result<ByteStream<'a>, ProviderError> {
    let attempts = retry_connect(
        provider,
        policy,
        hooks,
        || transport.open(request.clone()),
        tokio::time::sleep,
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::cancelled(
            "completion cancelled before the stream opened",
        )),
        result = attempts => result,
    }
}

/// Joins a base URL and a path with exactly one slash between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pulls `error.message` (or a bare `error` string) out of an error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        error => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
