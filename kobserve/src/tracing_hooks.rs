//! Tracing-based observability hooks for provider, tool, store and
//! conversation phases.
//!
//! ```rust
//! use kchat::ConversationHooks;
//! use kobserve::TracingObservabilityHooks;
//!
//! fn accepts_conversation_hooks(_hooks: &dyn ConversationHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_conversation_hooks(&hooks);
//! ```

use std::path::Path;
use std::time::Duration;

use kchat::{ChatError, ConversationHooks, TurnStopReason};
use kcommon::ChatId;
use kprovider::{ProviderError, ProviderId, ProviderOperationHooks};
use kstore::{StoreError, StoreHooks, StoreOperation};
use ktooling::{ToolCallResult, ToolError, ToolInvocation, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_connect_attempt(&self, provider: ProviderId, attempt: u32) {
        tracing::debug!(
            phase = "provider",
            event = "connect_attempt",
            provider = %provider,
            attempt
        );
    }

    fn on_connect_retry(
        &self,
        provider: ProviderId,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        tracing::warn!(
            phase = "provider",
            event = "connect_retry",
            provider = %provider,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_connected(&self, provider: ProviderId, attempts: u32) {
        tracing::info!(
            phase = "provider",
            event = "connected",
            provider = %provider,
            attempts
        );
    }

    fn on_connect_failed(&self, provider: ProviderId, attempts: u32, error: &ProviderError) {
        tracing::error!(
            phase = "provider",
            event = "connect_failed",
            provider = %provider,
            attempts,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_stream_line_skipped(&self, provider: ProviderId, reason: &str) {
        tracing::warn!(
            phase = "stream",
            event = "line_skipped",
            provider = %provider,
            reason
        );
    }

    fn on_stream_completed(&self, provider: ProviderId, events: usize) {
        tracing::debug!(
            phase = "stream",
            event = "completed",
            provider = %provider,
            events
        );
    }

    fn on_stream_failed(&self, provider: ProviderId, events: usize, error: &ProviderError) {
        tracing::error!(
            phase = "stream",
            event = "failed",
            provider = %provider,
            events,
            error_kind = ?error.kind,
            error = %error
        );
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_server_connected(&self, server: &str, tools: usize) {
        tracing::info!(phase = "tool", event = "server_connected", server, tools);
    }

    fn on_server_failed(&self, server: &str, error: &ToolError) {
        tracing::error!(
            phase = "tool",
            event = "server_failed",
            server,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_execution_start(&self, server: &str, tool: &str) {
        tracing::info!(phase = "tool", event = "execution_start", server, tool);
    }

    fn on_execution_success(
        &self,
        server: &str,
        tool: &str,
        result: &ToolCallResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "tool",
            event = "execution_success",
            server,
            tool,
            parts = result.content.len(),
            is_error = result.is_error,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_execution_failure(&self, server: &str, tool: &str, error: &ToolError, elapsed: Duration) {
        tracing::error!(
            phase = "tool",
            event = "execution_failure",
            server,
            tool,
            elapsed_ms = elapsed.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error
        );
    }
}

impl StoreHooks for TracingObservabilityHooks {
    fn on_loaded(&self, path: &Path, records: usize) {
        tracing::info!(
            phase = "store",
            event = "loaded",
            path = %path.display(),
            records
        );
    }

    fn on_line_skipped(&self, path: &Path, line: usize, reason: &str) {
        tracing::warn!(
            phase = "store",
            event = "line_skipped",
            path = %path.display(),
            line,
            reason
        );
    }

    fn on_worker_started(&self, worker: usize) {
        tracing::debug!(phase = "store", event = "worker_started", worker);
    }

    fn on_worker_stopped(&self, worker: usize) {
        tracing::debug!(phase = "store", event = "worker_stopped", worker);
    }

    fn on_operation_enqueued(&self, operation: StoreOperation) {
        tracing::trace!(
            phase = "store",
            event = "operation_enqueued",
            operation = operation.as_str()
        );
    }

    fn on_operation_completed(&self, operation: StoreOperation, elapsed: Duration) {
        tracing::debug!(
            phase = "store",
            event = "operation_completed",
            operation = operation.as_str(),
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_operation_failed(&self, operation: StoreOperation, error: &StoreError) {
        tracing::warn!(
            phase = "store",
            event = "operation_failed",
            operation = operation.as_str(),
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_rollback(&self, operation: StoreOperation, key: &str, error: &StoreError) {
        tracing::error!(
            phase = "store",
            event = "rollback",
            operation = operation.as_str(),
            key,
            error = %error
        );
    }

    fn on_shutdown(&self) {
        tracing::info!(phase = "store", event = "shutdown");
    }
}

impl ConversationHooks for TracingObservabilityHooks {
    fn on_turn_start(&self, chat_id: &ChatId, transcript_len: usize) {
        tracing::info!(
            phase = "conversation",
            event = "turn_start",
            chat_id = %chat_id,
            transcript_len
        );
    }

    fn on_completion_requested(&self, chat_id: &ChatId, completion: usize) {
        tracing::debug!(
            phase = "conversation",
            event = "completion_requested",
            chat_id = %chat_id,
            turn = completion
        );
    }

    fn on_reply_received(&self, chat_id: &ChatId, completion: usize, chars: usize) {
        tracing::debug!(
            phase = "conversation",
            event = "reply_received",
            chat_id = %chat_id,
            turn = completion,
            chars
        );
    }

    fn on_no_response(&self, chat_id: &ChatId, completion: usize) {
        tracing::warn!(
            phase = "conversation",
            event = "no_response",
            chat_id = %chat_id,
            turn = completion
        );
    }

    fn on_provider_failure(&self, chat_id: &ChatId, completion: usize, error: &ProviderError) {
        tracing::error!(
            phase = "conversation",
            event = "provider_failure",
            chat_id = %chat_id,
            turn = completion,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_tool_requested(&self, chat_id: &ChatId, invocation: &ToolInvocation) {
        tracing::info!(
            phase = "conversation",
            event = "tool_requested",
            chat_id = %chat_id,
            server = invocation.server,
            tool = invocation.tool
        );
    }

    fn on_tool_completed(&self, chat_id: &ChatId, invocation: &ToolInvocation, elapsed: Duration) {
        tracing::info!(
            phase = "conversation",
            event = "tool_completed",
            chat_id = %chat_id,
            server = invocation.server,
            tool = invocation.tool,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_tool_failure(
        &self,
        chat_id: &ChatId,
        invocation: &ToolInvocation,
        error: &ToolError,
        elapsed: Duration,
    ) {
        tracing::error!(
            phase = "conversation",
            event = "tool_failure",
            chat_id = %chat_id,
            server = invocation.server,
            tool = invocation.tool,
            elapsed_ms = elapsed.as_millis() as u64,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_turn_limit_reached(&self, chat_id: &ChatId, max_turns: usize) {
        tracing::warn!(
            phase = "conversation",
            event = "turn_limit_reached",
            chat_id = %chat_id,
            max_turns
        );
    }

    fn on_persisted(&self, chat_id: &ChatId, messages: usize) {
        tracing::debug!(
            phase = "conversation",
            event = "persisted",
            chat_id = %chat_id,
            messages
        );
    }

    fn on_persist_failure(&self, chat_id: &ChatId, error: &ChatError) {
        tracing::error!(
            phase = "conversation",
            event = "persist_failure",
            chat_id = %chat_id,
            error_kind = ?error.kind,
            error = %error
        );
    }

    fn on_turn_finished(&self, chat_id: &ChatId, reason: TurnStopReason, completions: usize) {
        tracing::info!(
            phase = "conversation",
            event = "turn_finished",
            chat_id = %chat_id,
            reason = reason.as_str(),
            completions
        );
    }
}
