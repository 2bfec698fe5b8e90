//! Ollama provider over the native `/api/chat` NDJSON stream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::http::{HttpStreamRequest, StreamingTransport, join_url, open_with_retry};
use crate::{
    BoxedEventStream, CompletionRequest, ContentPolicy, Delta, FramedLine, LineError, LineFraming,
    ModelProvider, NoopOperationHooks, ProviderError, ProviderFuture, ProviderId,
    ProviderOperationHooks, RetryPolicy, Role, StreamDecoder,
};

pub const OLLAMA_HOST_URL: &str = "http://localhost:11434";
pub const OLLAMA_CHAT_PATH: &str = "/api/chat";

/// Newline-delimited JSON framing; `"done": true` ends the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonFraming;

#[derive(Debug, Deserialize)]
struct ApiChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ApiChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChunkMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

impl LineFraming for NdjsonFraming {
    fn frame<'a>(&self, line: &'a str) -> FramedLine<'a> {
        FramedLine::Payload(line)
    }

    fn parse(&self, payload: &str) -> Result<Delta, LineError> {
        let chunk = serde_json::from_str::<ApiChatChunk>(payload)
            .map_err(|err| LineError::Malformed(format!("invalid chat chunk: {err}")))?;

        if let Some(error) = chunk.error {
            return Err(LineError::Fatal(ProviderError::unavailable(error)));
        }

        let (content, reasoning) = chunk
            .message
            .map(|message| (message.content, message.thinking))
            .unwrap_or_default();

        Ok(Delta {
            id: None,
            model: chunk.model,
            content,
            reasoning,
            is_final: chunk.done,
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    num_predict: u32,
}

/// Ollama only accepts string content, so structured parts are flattened.
pub fn build_request_body(request: &CompletionRequest) -> Result<Value, ProviderError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system_prompt) = &request.system_prompt {
        messages.push(ApiMessage {
            role: Role::System,
            content: system_prompt.clone(),
        });
    }
    messages.extend(request.messages.iter().map(|message| ApiMessage {
        role: message.role,
        content: message.text().into_owned(),
    }));

    let body = ApiChatRequest {
        model: &request.model,
        messages,
        stream: true,
        options: request
            .max_tokens
            .map(|num_predict| ApiOptions { num_predict }),
    };

    serde_json::to_value(body).map_err(|err| ProviderError::invalid_request(err.to_string()))
}

#[derive(Clone)]
pub struct OllamaProvider {
    transport: Arc<dyn StreamingTransport>,
    base_url: String,
    policy: ContentPolicy,
    retry: RetryPolicy,
    hooks: Arc<dyn ProviderOperationHooks>,
}

impl OllamaProvider {
    pub fn new(transport: Arc<dyn StreamingTransport>) -> Self {
        Self {
            transport,
            base_url: OLLAMA_HOST_URL.to_string(),
            policy: ContentPolicy::default(),
            retry: RetryPolicy::default(),
            hooks: Arc::new(NoopOperationHooks),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_content_policy(mut self, policy: ContentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, OLLAMA_CHAT_PATH)
    }
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("endpoint", &self.endpoint())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ModelProvider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            let http_request = HttpStreamRequest {
                url: self.endpoint(),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: build_request_body(&request)?,
            };

            let body = open_with_retry(
                self.id(),
                self.transport.as_ref(),
                http_request,
                &self.retry,
                self.hooks.as_ref(),
                &cancel,
            )
            .await?;

            Ok(StreamDecoder::new(self.id(), NdjsonFraming)
                .with_policy(self.policy)
                .with_hooks(Arc::clone(&self.hooks))
                .decode(body, cancel))
        })
    }
}
