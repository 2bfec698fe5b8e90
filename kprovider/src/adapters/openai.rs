//! OpenAI-compatible chat-completions provider (OpenAI, OpenRouter, and friends).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::http::{HttpStreamRequest, StreamingTransport, join_url, open_with_retry};
use crate::{
    BoxedEventStream, CacheControl, CompletionRequest, ContentPart, ContentPolicy, Delta,
    FramedLine, LineError, LineFraming, Message, MessageContent, ModelProvider,
    NoopOperationHooks, ProviderError, ProviderFuture, ProviderId, ProviderOperationHooks,
    RetryPolicy, Role, SecretString, StreamDecoder,
};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_REFERER: &str = "https://github.com/philogroves/kcli";
pub const DEFAULT_TITLE: &str = "kcli";

const DONE_SENTINEL: &str = "[DONE]";

/// Server-sent-events framing: `data: {json}` lines ending with `data: [DONE]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseFraming;

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    error: Option<ApiStreamError>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamError {
    #[serde(default)]
    message: String,
}

impl LineFraming for SseFraming {
    fn frame<'a>(&self, line: &'a str) -> FramedLine<'a> {
        let Some(payload) = line.strip_prefix("data:") else {
            return FramedLine::Skip;
        };

        match payload.trim() {
            "" => FramedLine::Skip,
            DONE_SENTINEL => FramedLine::Sentinel,
            payload => FramedLine::Payload(payload),
        }
    }

    fn parse(&self, payload: &str) -> Result<Delta, LineError> {
        let chunk = serde_json::from_str::<ApiStreamChunk>(payload)
            .map_err(|err| LineError::Malformed(format!("invalid stream chunk: {err}")))?;

        if let Some(error) = chunk.error {
            return Err(LineError::Fatal(ProviderError::unavailable(error.message)));
        }

        let mut delta = Delta {
            id: chunk.id,
            model: chunk.model,
            ..Delta::default()
        };

        if let Some(choice) = chunk.choices.into_iter().next() {
            delta.content = choice.delta.content;
            delta.reasoning = choice.delta.reasoning_content.or(choice.delta.reasoning);
            delta.is_final = choice
                .finish_reason
                .is_some_and(|reason| !reason.is_empty());
        }

        Ok(delta)
    }
}

#[derive(Debug, Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    include_reasoning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: Role,
    content: MessageContent,
}

impl ApiMessage {
    fn from_message(model: &str, message: &Message) -> Self {
        Self {
            role: message.role,
            content: wire_content(model, &message.content),
        }
    }
}

/// Claude 3 models behind OpenAI-compatible gateways accept prompt caching
/// hints on text parts.
fn wire_content(model: &str, content: &MessageContent) -> MessageContent {
    if !model.contains("claude-3") {
        return content.clone();
    }

    let parts = match content {
        MessageContent::Text(text) => vec![ContentPart::text(text.clone())],
        MessageContent::Parts(parts) => parts.clone(),
    };

    MessageContent::Parts(
        parts
            .into_iter()
            .map(|part| {
                if part.is_text() {
                    part.with_cache_control(CacheControl::ephemeral())
                } else {
                    part
                }
            })
            .collect(),
    )
}

/// Builds the JSON body. Message timestamps and metadata never reach the wire.
pub fn build_request_body(request: &CompletionRequest) -> Result<Value, ProviderError> {
    let model = request.model.as_str();
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system_prompt) = &request.system_prompt {
        messages.push(ApiMessage::from_message(model, &Message::system(system_prompt.as_str())));
    }
    messages.extend(
        request
            .messages
            .iter()
            .map(|message| ApiMessage::from_message(model, message)),
    );

    let body = ApiChatRequest {
        model,
        messages,
        stream: true,
        max_tokens: request.max_tokens,
        reasoning_effort: request.reasoning_effort.as_deref(),
        include_reasoning: model.contains("deepseek-r1").then_some(true),
        thinking: model.contains("DeepSeek-V3_1").then_some(true),
    };

    serde_json::to_value(body).map_err(|err| ProviderError::invalid_request(err.to_string()))
}

#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    transport: Arc<dyn StreamingTransport>,
    api_key: SecretString,
    base_url: String,
    api_path: String,
    referer: String,
    title: String,
    policy: ContentPolicy,
    retry: RetryPolicy,
    hooks: Arc<dyn ProviderOperationHooks>,
}

impl OpenAiCompatibleProvider {
    pub fn new(transport: Arc<dyn StreamingTransport>, api_key: SecretString) -> Self {
        Self {
            transport,
            api_key,
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_path: CHAT_COMPLETIONS_PATH.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            policy: ContentPolicy::default(),
            retry: RetryPolicy::default(),
            hooks: Arc::new(NoopOperationHooks),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_path(mut self, api_path: impl Into<String>) -> Self {
        self.api_path = api_path.into();
        self
    }

    pub fn with_app_identity(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
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
        join_url(&self.base_url, &self.api_path)
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("HTTP-Referer".to_string(), self.referer.clone()),
            ("X-Title".to_string(), self.title.clone()),
        ];
        if !self.api_key.is_empty() {
            headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key.expose()),
            ));
        }
        headers
    }
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("endpoint", &self.endpoint())
            .field("api_key", &self.api_key)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ModelProvider for OpenAiCompatibleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            let http_request = HttpStreamRequest {
                url: self.endpoint(),
                headers: self.headers(),
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

            Ok(StreamDecoder::new(self.id(), SseFraming)
                .with_policy(self.policy)
                .with_hooks(Arc::clone(&self.hooks))
                .decode(body, cancel))
        })
    }
}
