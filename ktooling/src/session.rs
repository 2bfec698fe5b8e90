//! The tool session seam between the conversation engine and tool servers.

use kcommon::BoxFuture;
use serde_json::{Map, Value};

use crate::{
    ResourceDescriptor, ResourceTemplateDescriptor, ToolCallResult, ToolCatalog, ToolDescriptor,
    ToolError,
};

pub type ToolFuture<'a, T> = BoxFuture<'a, T>;

/// A connection to one or more tool servers.
///
/// Only `call_tool` is required; listings default to empty so that simple
/// in-process sessions stay small.
pub trait ToolSession: Send + Sync {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, Value>,
    ) -> ToolFuture<'a, Result<ToolCallResult, ToolError>>;

    fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ToolDescriptor>, ToolError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn list_resources<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ResourceDescriptor>, ToolError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn list_resource_templates<'a>(
        &'a self,
    ) -> ToolFuture<'a, Result<Vec<ResourceTemplateDescriptor>, ToolError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    /// Tools and resources offered to the model in the system prompt.
    fn catalog(&self) -> ToolCatalog {
        ToolCatalog::default()
    }

    fn close<'a>(&'a self) -> ToolFuture<'a, ()> {
        Box::pin(async {})
    }
}

/// A session with no tools; every call fails with `NotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToolSession;

impl ToolSession for NoToolSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        _arguments: Map<String, Value>,
    ) -> ToolFuture<'a, Result<ToolCallResult, ToolError>> {
        Box::pin(async move {
            Err(ToolError::not_found("no tool servers are connected").with_tool_name(name))
        })
    }
}
