//! Metrics-based observability hooks for provider, tool, store and
//! conversation phases.
//!
//! ```rust
//! use kobserve::MetricsObservabilityHooks;
//! use kprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use std::path::Path;
use std::time::Duration;

use kchat::{ChatError, ConversationHooks, TurnStopReason};
use kcommon::ChatId;
use kprovider::{ProviderError, ProviderId, ProviderOperationHooks};
use kstore::{StoreError, StoreHooks, StoreOperation};
use ktooling::{ToolCallResult, ToolError, ToolInvocation, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl ProviderOperationHooks for MetricsObservabilityHooks {
    fn on_connect_attempt(&self, provider: ProviderId, _attempt: u32) {
        metrics::counter!(
            "kcli_provider_connect_attempts_total",
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    fn on_connect_retry(
        &self,
        provider: ProviderId,
        _attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        metrics::counter!(
            "kcli_provider_connect_retries_total",
            "provider" => provider.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "kcli_provider_connect_retry_delay_seconds",
            "provider" => provider.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_connected(&self, provider: ProviderId, attempts: u32) {
        metrics::histogram!(
            "kcli_provider_connect_attempts_per_stream",
            "provider" => provider.to_string()
        )
        .record(attempts as f64);
    }

    fn on_connect_failed(&self, provider: ProviderId, _attempts: u32, error: &ProviderError) {
        metrics::counter!(
            "kcli_provider_connect_failures_total",
            "provider" => provider.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_stream_line_skipped(&self, provider: ProviderId, _reason: &str) {
        metrics::counter!(
            "kcli_stream_lines_skipped_total",
            "provider" => provider.to_string()
        )
        .increment(1);
    }

    fn on_stream_completed(&self, provider: ProviderId, events: usize) {
        metrics::histogram!(
            "kcli_stream_events_per_completion",
            "provider" => provider.to_string()
        )
        .record(events as f64);
    }

    fn on_stream_failed(&self, provider: ProviderId, _events: usize, error: &ProviderError) {
        metrics::counter!(
            "kcli_stream_failure_total",
            "provider" => provider.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }
}

impl ToolRuntimeHooks for MetricsObservabilityHooks {
    fn on_server_connected(&self, server: &str, tools: usize) {
        metrics::gauge!("kcli_mcp_server_tools", "server" => server.to_string()).set(tools as f64);
    }

    fn on_server_failed(&self, server: &str, error: &ToolError) {
        metrics::counter!(
            "kcli_mcp_server_failure_total",
            "server" => server.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_execution_start(&self, server: &str, tool: &str) {
        metrics::counter!(
            "kcli_tool_execution_start_total",
            "server" => server.to_string(),
            "tool" => tool.to_string()
        )
        .increment(1);
    }

    fn on_execution_success(
        &self,
        server: &str,
        tool: &str,
        _result: &ToolCallResult,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "kcli_tool_execution_success_total",
            "server" => server.to_string(),
            "tool" => tool.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "kcli_tool_execution_latency_seconds",
            "server" => server.to_string(),
            "tool" => tool.to_string(),
            "outcome" => "success"
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_execution_failure(&self, server: &str, tool: &str, error: &ToolError, elapsed: Duration) {
        metrics::counter!(
            "kcli_tool_execution_failure_total",
            "server" => server.to_string(),
            "tool" => tool.to_string(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "kcli_tool_execution_latency_seconds",
            "server" => server.to_string(),
            "tool" => tool.to_string(),
            "outcome" => "failure"
        )
        .record(elapsed.as_secs_f64());
    }
}

impl StoreHooks for MetricsObservabilityHooks {
    fn on_loaded(&self, _path: &Path, records: usize) {
        metrics::gauge!("kcli_store_loaded_records").set(records as f64);
    }

    fn on_line_skipped(&self, _path: &Path, _line: usize, _reason: &str) {
        metrics::counter!("kcli_store_lines_skipped_total").increment(1);
    }

    fn on_worker_started(&self, _worker: usize) {
        metrics::gauge!("kcli_store_workers").increment(1.0);
    }

    fn on_worker_stopped(&self, _worker: usize) {
        metrics::gauge!("kcli_store_workers").decrement(1.0);
    }

    fn on_operation_enqueued(&self, operation: StoreOperation) {
        metrics::counter!(
            "kcli_store_operation_enqueued_total",
            "operation" => operation.as_str()
        )
        .increment(1);
    }

    fn on_operation_completed(&self, operation: StoreOperation, elapsed: Duration) {
        metrics::histogram!(
            "kcli_store_operation_latency_seconds",
            "operation" => operation.as_str()
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_operation_failed(&self, operation: StoreOperation, error: &StoreError) {
        metrics::counter!(
            "kcli_store_operation_failure_total",
            "operation" => operation.as_str(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_rollback(&self, operation: StoreOperation, _key: &str, _error: &StoreError) {
        metrics::counter!(
            "kcli_store_rollback_total",
            "operation" => operation.as_str()
        )
        .increment(1);
    }
}

impl ConversationHooks for MetricsObservabilityHooks {
    fn on_completion_requested(&self, _chat_id: &ChatId, _completion: usize) {
        metrics::counter!("kcli_conversation_completion_requests_total").increment(1);
    }

    fn on_reply_received(&self, _chat_id: &ChatId, _completion: usize, chars: usize) {
        metrics::histogram!("kcli_conversation_reply_chars").record(chars as f64);
    }

    fn on_provider_failure(&self, _chat_id: &ChatId, _completion: usize, error: &ProviderError) {
        metrics::counter!(
            "kcli_conversation_provider_failure_total",
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_tool_completed(&self, _chat_id: &ChatId, invocation: &ToolInvocation, elapsed: Duration) {
        metrics::histogram!(
            "kcli_conversation_tool_latency_seconds",
            "tool" => invocation.tool.clone()
        )
        .record(elapsed.as_secs_f64());
    }

    fn on_tool_failure(
        &self,
        _chat_id: &ChatId,
        invocation: &ToolInvocation,
        error: &ToolError,
        _elapsed: Duration,
    ) {
        metrics::counter!(
            "kcli_conversation_tool_failure_total",
            "tool" => invocation.tool.clone(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_persist_failure(&self, _chat_id: &ChatId, error: &ChatError) {
        metrics::counter!(
            "kcli_conversation_persist_failure_total",
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
    }

    fn on_turn_finished(&self, _chat_id: &ChatId, reason: TurnStopReason, completions: usize) {
        metrics::counter!(
            "kcli_conversation_turns_total",
            "reason" => reason.as_str()
        )
        .increment(1);
        metrics::histogram!("kcli_conversation_completions_per_turn").record(completions as f64);
    }
}
