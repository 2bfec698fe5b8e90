//! Tool-use detection in model output and dispatch to MCP tool servers.
//!
//! ```rust
//! use ktooling::{ServerCatalog, ToolCatalog, ToolUseParser};
//!
//! let parsed = ToolUseParser::default().parse(
//!     "<use_mcp_tool><server_name>todo</server_name><tool_name>list</tool_name>\
//!      <arguments>{}</arguments></use_mcp_tool>",
//! );
//! assert!(parsed.is_some());
//!
//! let catalog = ToolCatalog::new(vec![ServerCatalog::new("todo")]);
//! assert_eq!(catalog.render(), "## todo");
//! ```

mod catalog;
mod error;
mod hooks;
pub mod mcp;
mod parser;
mod session;
mod types;

pub mod prelude {
    pub use crate::{
        NoToolSession, ParsedToolUse, ToolCallResult, ToolCatalog, ToolContent, ToolError,
        ToolErrorKind, ToolFuture, ToolInvocation, ToolSession, ToolUseParser,
    };
    pub use crate::mcp::{McpServerConfig, McpSessionManager};
}

pub use catalog::{ServerCatalog, ToolCatalog};
pub use error::{ToolError, ToolErrorKind};
pub use hooks::{NoopToolRuntimeHooks, ToolRuntimeHooks};
pub use parser::{ParsedToolUse, ToolBlock, ToolMarker, ToolUseParser};
pub use session::{NoToolSession, ToolFuture, ToolSession};
pub use types::{
    ResourceDescriptor, ResourceTemplateDescriptor, ToolCallResult, ToolContent, ToolDescriptor,
    ToolInvocation,
};
