//! Store lifecycle hooks.

use std::path::Path;
use std::time::Duration;

use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    List,
    Get,
    Add,
    Update,
    Delete,
}

impl StoreOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

pub trait StoreHooks: Send + Sync {
    fn on_loaded(&self, _path: &Path, _records: usize) {}

    fn on_line_skipped(&self, _path: &Path, _line: usize, _reason: &str) {}

    fn on_worker_started(&self, _worker: usize) {}

    fn on_worker_stopped(&self, _worker: usize) {}

    fn on_operation_enqueued(&self, _operation: StoreOperation) {}

    fn on_operation_completed(&self, _operation: StoreOperation, _elapsed: Duration) {}

    fn on_operation_failed(&self, _operation: StoreOperation, _error: &StoreError) {}

    /// A cache change was reverted because the file rewrite failed.
    fn on_rollback(&self, _operation: StoreOperation, _key: &str, _error: &StoreError) {}

    fn on_shutdown(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStoreHooks;

impl StoreHooks for NoopStoreHooks {}
