use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Duration;

use kchat::{ChatError, ConversationHooks, TurnStopReason};
use kcommon::ChatId;
use kprovider::{ProviderError, ProviderId, ProviderOperationHooks};
use kstore::{StoreError, StoreHooks, StoreOperation};
use ktooling::{ToolCallResult, ToolError, ToolInvocation, ToolRuntimeHooks};

fn shielded(callback: impl FnOnce()) {
    let _ = catch_unwind(AssertUnwindSafe(callback));
}

pub struct SafeProviderHooks<H> {
    inner: H,
}

impl<H> SafeProviderHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ProviderOperationHooks for SafeProviderHooks<H>
where
    H: ProviderOperationHooks,
{
    fn on_connect_attempt(&self, provider: ProviderId, attempt: u32) {
        shielded(|| self.inner.on_connect_attempt(provider, attempt));
    }

    fn on_connect_retry(
        &self,
        provider: ProviderId,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        shielded(|| self.inner.on_connect_retry(provider, attempt, delay, error));
    }

    fn on_connected(&self, provider: ProviderId, attempts: u32) {
        shielded(|| self.inner.on_connected(provider, attempts));
    }

    fn on_connect_failed(&self, provider: ProviderId, attempts: u32, error: &ProviderError) {
        shielded(|| self.inner.on_connect_failed(provider, attempts, error));
    }

    fn on_stream_line_skipped(&self, provider: ProviderId, reason: &str) {
        shielded(|| self.inner.on_stream_line_skipped(provider, reason));
    }

    fn on_stream_completed(&self, provider: ProviderId, events: usize) {
        shielded(|| self.inner.on_stream_completed(provider, events));
    }

    fn on_stream_failed(&self, provider: ProviderId, events: usize, error: &ProviderError) {
        shielded(|| self.inner.on_stream_failed(provider, events, error));
    }
}

pub struct SafeToolHooks<H> {
    inner: H,
}

impl<H> SafeToolHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ToolRuntimeHooks for SafeToolHooks<H>
where
    H: ToolRuntimeHooks,
{
    fn on_server_connected(&self, server: &str, tools: usize) {
        shielded(|| self.inner.on_server_connected(server, tools));
    }

    fn on_server_failed(&self, server: &str, error: &ToolError) {
        shielded(|| self.inner.on_server_failed(server, error));
    }

    fn on_execution_start(&self, server: &str, tool: &str) {
        shielded(|| self.inner.on_execution_start(server, tool));
    }

    fn on_execution_success(
        &self,
        server: &str,
        tool: &str,
        result: &ToolCallResult,
        elapsed: Duration,
    ) {
        shielded(|| {
            self.inner
                .on_execution_success(server, tool, result, elapsed)
        });
    }

    fn on_execution_failure(&self, server: &str, tool: &str, error: &ToolError, elapsed: Duration) {
        shielded(|| {
            self.inner
                .on_execution_failure(server, tool, error, elapsed)
        });
    }
}

pub struct SafeStoreHooks<H> {
    inner: H,
}

impl<H> SafeStoreHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> StoreHooks for SafeStoreHooks<H>
where
    H: StoreHooks,
{
    fn on_loaded(&self, path: &Path, records: usize) {
        shielded(|| self.inner.on_loaded(path, records));
    }

    fn on_line_skipped(&self, path: &Path, line: usize, reason: &str) {
        shielded(|| self.inner.on_line_skipped(path, line, reason));
    }

    fn on_worker_started(&self, worker: usize) {
        shielded(|| self.inner.on_worker_started(worker));
    }

    fn on_worker_stopped(&self, worker: usize) {
        shielded(|| self.inner.on_worker_stopped(worker));
    }

    fn on_operation_enqueued(&self, operation: StoreOperation) {
        shielded(|| self.inner.on_operation_enqueued(operation));
    }

    fn on_operation_completed(&self, operation: StoreOperation, elapsed: Duration) {
        shielded(|| self.inner.on_operation_completed(operation, elapsed));
    }

    fn on_operation_failed(&self, operation: StoreOperation, error: &StoreError) {
        shielded(|| self.inner.on_operation_failed(operation, error));
    }

    fn on_rollback(&self, operation: StoreOperation, key: &str, error: &StoreError) {
        shielded(|| self.inner.on_rollback(operation, key, error));
    }

    fn on_shutdown(&self) {
        shielded(|| self.inner.on_shutdown());
    }
}

pub struct SafeConversationHooks<H> {
    inner: H,
}

impl<H> SafeConversationHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ConversationHooks for SafeConversationHooks<H>
where
    H: ConversationHooks,
{
    fn on_turn_start(&self, chat_id: &ChatId, transcript_len: usize) {
        shielded(|| self.inner.on_turn_start(chat_id, transcript_len));
    }

    fn on_completion_requested(&self, chat_id: &ChatId, completion: usize) {
        shielded(|| self.inner.on_completion_requested(chat_id, completion));
    }

    fn on_reply_received(&self, chat_id: &ChatId, completion: usize, chars: usize) {
        shielded(|| self.inner.on_reply_received(chat_id, completion, chars));
    }

    fn on_no_response(&self, chat_id: &ChatId, completion: usize) {
        shielded(|| self.inner.on_no_response(chat_id, completion));
    }

    fn on_provider_failure(&self, chat_id: &ChatId, completion: usize, error: &ProviderError) {
        shielded(|| self.inner.on_provider_failure(chat_id, completion, error));
    }

    fn on_tool_requested(&self, chat_id: &ChatId, invocation: &ToolInvocation) {
        shielded(|| self.inner.on_tool_requested(chat_id, invocation));
    }

    fn on_tool_completed(&self, chat_id: &ChatId, invocation: &ToolInvocation, elapsed: Duration) {
        shielded(|| self.inner.on_tool_completed(chat_id, invocation, elapsed));
    }

    fn on_tool_failure(
        &self,
        chat_id: &ChatId,
        invocation: &ToolInvocation,
        error: &ToolError,
        elapsed: Duration,
    ) {
        shielded(|| {
            self.inner
                .on_tool_failure(chat_id, invocation, error, elapsed)
        });
    }

    fn on_turn_limit_reached(&self, chat_id: &ChatId, max_turns: usize) {
        shielded(|| self.inner.on_turn_limit_reached(chat_id, max_turns));
    }

    fn on_persisted(&self, chat_id: &ChatId, messages: usize) {
        shielded(|| self.inner.on_persisted(chat_id, messages));
    }

    fn on_persist_failure(&self, chat_id: &ChatId, error: &ChatError) {
        shielded(|| self.inner.on_persist_failure(chat_id, error));
    }

    fn on_turn_finished(&self, chat_id: &ChatId, reason: TurnStopReason, completions: usize) {
        shielded(|| self.inner.on_turn_finished(chat_id, reason, completions));
    }
}
