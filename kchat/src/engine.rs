//! The conversation turn loop.
//!
//! One call to [`ConversationEngine::handle_user_input`] is one turn: the user
//! message is appended, then the engine alternates between completion requests
//! and tool dispatches until the model answers without a tool-use block, a
//! collaborator fails, the caller cancels, or `max_turns` completion requests
//! have been made. Only a completed turn is persisted.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use kcommon::{ChatId, generate_chat_id};
use kprovider::{
    AssistantReply, CancellationToken, CompletionRequest, Message, ModelProvider, ProviderError,
    collect_reply,
};
use ktooling::{ToolInvocation, ToolSession, ToolUseParser};

use crate::{ChatError, ChatService, ConversationHooks, NoopConversationHooks, SystemPromptComposer};

pub const DEFAULT_MAX_TURNS: usize = 10;

/// Model parameters and the turn bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub model: String,
    pub max_turns: usize,
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<String>,
}

impl EngineSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_turns: DEFAULT_MAX_TURNS,
            max_tokens: None,
            reasoning_effort: None,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = (max_tokens > 0).then_some(max_tokens);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        let effort = effort.into();
        self.reasoning_effort = (!effort.is_empty()).then_some(effort);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStopReason {
    /// The model answered without requesting a tool; the transcript was saved.
    Completed,
    /// The stream closed before any content arrived.
    NoResponse,
    ProviderFailed,
    ToolFailed,
    /// The tool answered with something other than text.
    UnsupportedToolResult,
    TurnLimitReached,
    Cancelled,
}

impl TurnStopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoResponse => "no_response",
            Self::ProviderFailed => "provider_failed",
            Self::ToolFailed => "tool_failed",
            Self::UnsupportedToolResult => "unsupported_tool_result",
            Self::TurnLimitReached => "turn_limit_reached",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub chat_id: ChatId,
    /// Visible text of the last assistant message appended during the turn.
    pub reply: Option<String>,
    /// Number of completion requests made.
    pub completions: usize,
    pub stop_reason: TurnStopReason,
}

enum Step {
    Continue,
    Stop(TurnStopReason),
}

/// Drives one chat: owns its in-progress transcript and hands finished
/// transcripts to the [`ChatService`].
pub struct ConversationEngine {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolSession>,
    chats: ChatService,
    settings: EngineSettings,
    composer: SystemPromptComposer,
    parser: ToolUseParser,
    hooks: Arc<dyn ConversationHooks>,
    chat_id: Option<ChatId>,
    transcript: Vec<Message>,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolSession>,
        chats: ChatService,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            chats,
            settings,
            composer: SystemPromptComposer::default(),
            parser: ToolUseParser::default(),
            hooks: Arc::new(NoopConversationHooks),
            chat_id: None,
            transcript: Vec::new(),
        }
    }

    pub fn with_composer(mut self, composer: SystemPromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_parser(mut self, parser: ToolUseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ConversationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Continues a persisted chat. Its stored transcript becomes the history
    /// for the next turn.
    pub async fn resume(&mut self, chat_id: &ChatId) -> Result<(), ChatError> {
        let record = self
            .chats
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| ChatError::not_found(format!("chat '{chat_id}' not found")))?;

        self.chat_id = Some(chat_id.clone());
        self.transcript = record.messages;
        Ok(())
    }

    /// Forgets the current chat; the next turn starts a new one.
    pub fn reset(&mut self) {
        self.chat_id = None;
        self.transcript.clear();
    }

    /// Runs one turn.
    ///
    /// Returns `Err` only for invalid input or when saving a completed turn
    /// fails. Every other outcome is reported through
    /// [`TurnReport::stop_reason`], leaving the transcript at the last message
    /// that was fully appended.
    pub async fn handle_user_input(
        &mut self,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<TurnReport, ChatError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::invalid_request("user input must not be empty"));
        }
        if self.settings.max_turns == 0 {
            return Err(ChatError::invalid_request("max_turns must be greater than zero"));
        }
        if self.settings.model.trim().is_empty() {
            return Err(ChatError::invalid_request("model must not be empty"));
        }

        let chat_id = self.chat_id.get_or_insert_with(generate_chat_id).clone();
        self.transcript.push(Message::user(input).stamped_now());
        self.hooks.on_turn_start(&chat_id, self.transcript.len());

        let system_prompt = self.composer.compose(&self.tools.catalog(), Utc::now());
        let mut completions = 0;
        let mut reply = None;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break TurnStopReason::Cancelled;
            }
            if completions >= self.settings.max_turns {
                self.hooks
                    .on_turn_limit_reached(&chat_id, self.settings.max_turns);
                break TurnStopReason::TurnLimitReached;
            }

            completions += 1;
            self.hooks.on_completion_requested(&chat_id, completions);

            let assistant_reply = match self
                .request_reply(self.build_request(&system_prompt), cancel.clone())
                .await
            {
                Ok(Some(assistant_reply)) => assistant_reply,
                Ok(None) => {
                    self.hooks.on_no_response(&chat_id, completions);
                    break TurnStopReason::NoResponse;
                }
                Err(error) if error.is_cancelled() => break TurnStopReason::Cancelled,
                Err(error) => {
                    self.hooks
                        .on_provider_failure(&chat_id, completions, &error);
                    break TurnStopReason::ProviderFailed;
                }
            };
            self.hooks
                .on_reply_received(&chat_id, completions, assistant_reply.content.len());

            match self.apply_reply(&chat_id, assistant_reply, &mut reply, &cancel).await {
                Step::Continue => {}
                Step::Stop(reason) => break reason,
            }
        };

        if stop_reason.is_completed() {
            match self.chats.save_chat(&chat_id, self.transcript.clone()).await {
                Ok(record) => self.hooks.on_persisted(&chat_id, record.messages.len()),
                Err(error) => {
                    self.hooks.on_persist_failure(&chat_id, &error);
                    return Err(error);
                }
            }
        }

        self.hooks
            .on_turn_finished(&chat_id, stop_reason, completions);

        Ok(TurnReport {
            chat_id,
            reply,
            completions,
            stop_reason,
        })
    }

    fn build_request(&self, system_prompt: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.settings.model.clone(), self.transcript.clone())
            .with_system_prompt(system_prompt);
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(effort) = &self.settings.reasoning_effort {
            request = request.with_reasoning_effort(effort.clone());
        }
        request
    }

    async fn request_reply(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Option<AssistantReply>, ProviderError> {
        let stream = self.provider.stream_completion(request, cancel).await?;
        collect_reply(stream).await
    }

    fn assistant_message(&self, reply: &AssistantReply, content: String) -> Message {
        let mut message = Message::assistant(content)
            .stamped_now()
            .with_model(
                reply
                    .model
                    .clone()
                    .unwrap_or_else(|| self.settings.model.clone()),
            )
            .with_provider(self.provider.id().as_str());
        if let Some(id) = &reply.id {
            message = message.with_id(id.clone());
        }
        if let Some(effort) = &self.settings.reasoning_effort {
            message = message.with_reasoning_effort(effort.clone());
        }
        message
    }

    /// Appends the assistant message and, when it carries a tool-use block,
    /// dispatches the tool and appends its text result.
    async fn apply_reply(
        &mut self,
        chat_id: &ChatId,
        assistant_reply: AssistantReply,
        reply: &mut Option<String>,
        cancel: &CancellationToken,
    ) -> Step {
        let Some(parsed) = self.parser.parse(&assistant_reply.content) else {
            let message = self.assistant_message(&assistant_reply, assistant_reply.content.clone());
            *reply = Some(assistant_reply.content);
            self.transcript.push(message);
            return Step::Stop(TurnStopReason::Completed);
        };

        let ToolInvocation {
            server,
            tool,
            arguments,
        } = parsed.invocation.clone();
        let assistant = self
            .assistant_message(&assistant_reply, parsed.visible_text.clone())
            .with_tool_dispatch(server, tool.clone(), arguments.clone());
        *reply = Some(parsed.visible_text);
        self.transcript.push(assistant.clone());

        self.hooks.on_tool_requested(chat_id, &parsed.invocation);
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Stop(TurnStopReason::Cancelled),
            outcome = self.tools.call_tool(&tool, arguments) => outcome,
        };

        let text = match outcome.and_then(|result| result.first_text().map(str::to_string)) {
            Ok(text) => text,
            Err(error) => {
                self.hooks
                    .on_tool_failure(chat_id, &parsed.invocation, &error, started.elapsed());
                return Step::Stop(match error.kind {
                    ktooling::ToolErrorKind::UnsupportedResult => {
                        TurnStopReason::UnsupportedToolResult
                    }
                    _ => TurnStopReason::ToolFailed,
                });
            }
        };
        self.hooks
            .on_tool_completed(chat_id, &parsed.invocation, started.elapsed());

        let mut tool_message = Message::tool(text).stamped_now();
        tool_message.id = assistant.id;
        tool_message.model = assistant.model;
        tool_message.provider = assistant.provider;
        self.transcript.push(tool_message);

        Step::Continue
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("provider", &self.provider.id())
            .field("settings", &self.settings)
            .field("chat_id", &self.chat_id)
            .field("transcript_len", &self.transcript.len())
            .finish()
    }
}
