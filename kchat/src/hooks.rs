//! Conversation lifecycle hooks.

use std::time::Duration;

use kcommon::ChatId;
use kprovider::ProviderError;
use ktooling::{ToolError, ToolInvocation};

use crate::{ChatError, TurnStopReason};

pub trait ConversationHooks: Send + Sync {
    fn on_turn_start(&self, _chat_id: &ChatId, _transcript_len: usize) {}

    fn on_completion_requested(&self, _chat_id: &ChatId, _completion: usize) {}

    fn on_reply_received(&self, _chat_id: &ChatId, _completion: usize, _chars: usize) {}

    fn on_no_response(&self, _chat_id: &ChatId, _completion: usize) {}

    fn on_provider_failure(&self, _chat_id: &ChatId, _completion: usize, _error: &ProviderError) {}

    fn on_tool_requested(&self, _chat_id: &ChatId, _invocation: &ToolInvocation) {}

    fn on_tool_completed(&self, _chat_id: &ChatId, _invocation: &ToolInvocation, _elapsed: Duration) {}

    fn on_tool_failure(
        &self,
        _chat_id: &ChatId,
        _invocation: &ToolInvocation,
        _error: &ToolError,
        _elapsed: Duration,
    ) {
    }

    fn on_turn_limit_reached(&self, _chat_id: &ChatId, _max_turns: usize) {}

    fn on_persisted(&self, _chat_id: &ChatId, _messages: usize) {}

    fn on_persist_failure(&self, _chat_id: &ChatId, _error: &ChatError) {}

    fn on_turn_finished(&self, _chat_id: &ChatId, _reason: TurnStopReason, _completions: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConversationHooks;

impl ConversationHooks for NoopConversationHooks {}
