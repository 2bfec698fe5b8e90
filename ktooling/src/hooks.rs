//! Runtime hooks for tool dispatch lifecycle events.
//!
//! ```rust
//! use ktooling::{NoopToolRuntimeHooks, ToolRuntimeHooks};
//!
//! fn assert_hooks_trait(_hooks: &dyn ToolRuntimeHooks) {}
//!
//! let hooks = NoopToolRuntimeHooks;
//! assert_hooks_trait(&hooks);
//! ```

use std::time::Duration;

use crate::{ToolCallResult, ToolError};

pub trait ToolRuntimeHooks: Send + Sync {
    fn on_server_connected(&self, _server: &str, _tools: usize) {}

    fn on_server_failed(&self, _server: &str, _error: &ToolError) {}

    fn on_execution_start(&self, _server: &str, _tool: &str) {}

    fn on_execution_success(
        &self,
        _server: &str,
        _tool: &str,
        _result: &ToolCallResult,
        _elapsed: Duration,
    ) {
    }

    fn on_execution_failure(&self, _server: &str, _tool: &str, _error: &ToolError, _elapsed: Duration) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolRuntimeHooks;

impl ToolRuntimeHooks for NoopToolRuntimeHooks {}
