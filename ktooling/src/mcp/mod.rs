//! Model-Context-Protocol client side: server configuration, the stdio
//! transport and the multi-server session manager.

mod config;
mod manager;
mod stdio;

pub use config::{
    DEFAULT_SERVER_ARGS, DEFAULT_SERVER_COMMAND, DEFAULT_SERVER_NAME, McpServerConfig,
    McpServerType,
};
pub use manager::{McpSessionManager, SessionConnector, StdioConnector};
pub use stdio::{MCP_CLIENT_NAME, MCP_CLIENT_VERSION, MCP_PROTOCOL_VERSION, StdioMcpSession};
