use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_NAME: &str = "todo";
pub const DEFAULT_SERVER_COMMAND: &str = "uvx";
pub const DEFAULT_SERVER_ARGS: &[&str] = &["mcp-todo"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum McpServerType {
    #[default]
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "streamableHttp")]
    StreamableHttp,
}

impl McpServerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamableHttp",
        }
    }
}

/// One line of the MCP server JSONL file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub server_type: McpServerType,
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "baseUrl", default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(rename = "autoConfirm", default, skip_serializing_if = "Vec::is_empty")]
    pub auto_confirm: Vec<String>,
}

impl McpServerConfig {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            server_type: McpServerType::Stdio,
            is_active: true,
            description: String::new(),
            base_url: String::new(),
            command: command.into(),
            args,
            auto_confirm: Vec::new(),
        }
    }

    /// The `todo` server seeded into an empty MCP server file.
    pub fn default_server() -> Self {
        Self::stdio(
            DEFAULT_SERVER_NAME,
            DEFAULT_SERVER_COMMAND,
            DEFAULT_SERVER_ARGS.iter().map(|arg| arg.to_string()).collect(),
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
