//! Newline-delimited JSON-RPC 2.0 over a child process's stdin and stdout.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{McpServerConfig, McpServerType};
use crate::{
    ResourceDescriptor, ResourceTemplateDescriptor, ToolCallResult, ToolError, ToolFuture,
    ToolSession, ToolDescriptor,
};

pub const MCP_CLIENT_NAME: &str = "kMCPClient";
pub const MCP_CLIENT_VERSION: &str = "v1.0.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Channel {
    lines: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
}

/// A single MCP server reached over stdio.
pub struct StdioMcpSession {
    server: String,
    channel: Mutex<Channel>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl std::fmt::Debug for StdioMcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioMcpSession")
            .field("server", &self.server)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StdioMcpSession {
    /// Spawns the configured command and performs the `initialize` handshake.
    pub async fn connect(config: &McpServerConfig) -> Result<Self, ToolError> {
        if config.server_type != McpServerType::Stdio {
            return Err(ToolError::transport(format!(
                "transport '{}' is not supported",
                config.server_type.as_str()
            ))
            .with_server_name(&config.name));
        }
        if config.command.trim().is_empty() {
            return Err(
                ToolError::invalid_arguments("stdio server has no command").with_server_name(&config.name)
            );
        }

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ToolError::transport(format!("failed to spawn '{}': {err}", config.command))
                    .with_server_name(&config.name)
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ToolError::transport("child process has no stdio pipes")
                .with_server_name(&config.name));
        };

        let session = Self::from_streams(&config.name, stdout, stdin);
        *session.child.lock().await = Some(child);
        session.initialize().await?;
        Ok(session)
    }

    /// Wraps an already-connected byte channel. The handshake is not performed.
    pub fn from_streams(
        server: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let reader: BoxedReader = Box::new(reader);
        Self {
            server: server.into(),
            channel: Mutex::new(Channel {
                lines: BufReader::new(reader).lines(),
                writer: Box::new(writer),
            }),
            child: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn initialize(&self) -> Result<Value, ToolError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": MCP_CLIENT_NAME, "version": MCP_CLIENT_VERSION}
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(result)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolError> {
        let mut channel = self.channel.lock().await;
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.write_message(&mut channel, &message).await
    }

    /// Sends one request and waits for the response with the same id.
    /// Notifications and unrelated responses received meanwhile are dropped.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let mut channel = self.channel.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.write_message(&mut channel, &message).await?;

        let response = tokio::time::timeout(self.timeout, read_response(&mut channel.lines, id))
            .await
            .map_err(|_| {
                ToolError::timeout(format!("'{method}' timed out after {:?}", self.timeout))
                    .with_server_name(&self.server)
            })?
            .map_err(|err| err.with_server_name(&self.server))?;

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let detail = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ToolError::protocol(format!("'{method}' failed ({code}): {detail}"))
                .with_server_name(&self.server));
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn write_message(&self, channel: &mut Channel, message: &Value) -> Result<(), ToolError> {
        let mut line = serde_json::to_vec(message)
            .map_err(|err| ToolError::protocol(err.to_string()).with_server_name(&self.server))?;
        line.push(b'\n');

        let transport =
            |err: std::io::Error| ToolError::transport(err.to_string()).with_server_name(&self.server);
        channel.writer.write_all(&line).await.map_err(transport)?;
        channel.writer.flush().await.map_err(transport)
    }

    /// Follows `nextCursor` until the listing is exhausted.
    async fn list_paged<T: DeserializeOwned>(&self, method: &str, field: &str) -> Result<Vec<T>, ToolError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let mut result = self.request(method, params).await?;

            let page = result.get_mut(field).map(Value::take).unwrap_or(Value::Array(Vec::new()));
            let page: Vec<T> = serde_json::from_value(page).map_err(|err| {
                ToolError::protocol(format!("invalid '{method}' result: {err}"))
                    .with_server_name(&self.server)
            })?;
            items.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(items);
            }
        }
    }
}

async fn read_response(
    lines: &mut Lines<BufReader<BoxedReader>>,
    id: u64,
) -> Result<Value, ToolError> {
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|err| ToolError::transport(err.to_string()))?
            .ok_or_else(|| ToolError::transport("server closed the connection"))?;

        let Ok(message) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        if message.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(message);
        }
    }
}

impl ToolSession for StdioMcpSession {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, Value>,
    ) -> ToolFuture<'a, Result<ToolCallResult, ToolError>> {
        Box::pin(async move {
            let result = self
                .request("tools/call", json!({"name": name, "arguments": arguments}))
                .await
                .map_err(|err| err.with_tool_name(name))?;

            serde_json::from_value(result).map_err(|err| {
                ToolError::protocol(format!("invalid tool result: {err}"))
                    .with_server_name(&self.server)
                    .with_tool_name(name)
            })
        })
    }

    fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ToolDescriptor>, ToolError>> {
        Box::pin(self.list_paged("tools/list", "tools"))
    }

    fn list_resources<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ResourceDescriptor>, ToolError>> {
        Box::pin(self.list_paged("resources/list", "resources"))
    }

    fn list_resource_templates<'a>(
        &'a self,
    ) -> ToolFuture<'a, Result<Vec<ResourceTemplateDescriptor>, ToolError>> {
        Box::pin(self.list_paged("resources/templates/list", "resourceTemplates"))
    }

    fn close<'a>(&'a self) -> ToolFuture<'a, ()> {
        Box::pin(async move {
            if let Some(mut child) = self.child.lock().await.take() {
                let _ = child.kill().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    use super::*;
    use crate::{ToolContent, ToolErrorKind};

    /// Answers each request line with `respond(method, params)`.
    fn fake_server(
        stream: DuplexStream,
        respond: impl Fn(&str, &Value) -> Option<Value> + Send + 'static,
    ) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let (reader, mut writer) = tokio::io::split(stream);
            let mut lines = BufReader::new(reader).lines();
            let mut methods = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = serde_json::from_str(&line).expect("client sends json");
                let method = message["method"].as_str().unwrap_or_default().to_string();
                methods.push(method.clone());
                let Some(id) = message.get("id").cloned() else {
                    continue;
                };
                writer
                    .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\"}\n")
                    .await
                    .expect("write notification");
                let reply = match respond(&method, &message["params"]) {
                    Some(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    None => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "no such method"}}),
                };
                let mut bytes = serde_json::to_vec(&reply).expect("reply");
                bytes.push(b'\n');
                writer.write_all(&bytes).await.expect("write reply");
            }
            methods
        })
    }

    fn session_with(
        respond: impl Fn(&str, &Value) -> Option<Value> + Send + 'static,
    ) -> (StdioMcpSession, tokio::task::JoinHandle<Vec<String>>) {
        let (client, server) = duplex(64 * 1024);
        let handle = fake_server(server, respond);
        let (reader, writer) = tokio::io::split(client);
        (StdioMcpSession::from_streams("todo", reader, writer), handle)
    }

    #[tokio::test]
    async fn handshake_then_tool_call_round_trip() {
        let (session, handle) = session_with(|method, params| match method {
            "initialize" => Some(json!({"protocolVersion": MCP_PROTOCOL_VERSION, "capabilities": {}})),
            "tools/call" => Some(json!({
                "content": [{"type": "text", "text": format!("added {}", params["arguments"]["title"])}],
                "isError": false
            })),
            _ => None,
        });

        session.initialize().await.expect("handshake should succeed");
        let mut arguments = Map::new();
        arguments.insert("title".to_string(), json!("milk"));
        let result = session
            .call_tool("add_task", arguments)
            .await
            .expect("call should succeed");

        assert_eq!(result.content, vec![ToolContent::text("added \"milk\"")]);

        drop(session);
        let methods = handle.await.expect("server task");
        assert_eq!(
            methods,
            vec!["initialize", "notifications/initialized", "tools/call"]
        );
    }

    #[tokio::test]
    async fn listings_follow_cursors() {
        let (session, _handle) = session_with(|method, params| match method {
            "tools/list" if params.get("cursor").is_none() => Some(json!({
                "tools": [{"name": "a", "description": "first", "inputSchema": {}}],
                "nextCursor": "page-2"
            })),
            "tools/list" => Some(json!({"tools": [{"name": "b"}]})),
            "resources/templates/list" => Some(json!({
                "resourceTemplates": [{"uriTemplate": "todo://{id}", "name": "task"}]
            })),
            _ => None,
        });

        let tools = session.list_tools().await.expect("tools");
        let templates = session.list_resource_templates().await.expect("templates");

        assert_eq!(
            tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(templates[0].uri_template, "todo://{id}");
    }

    #[tokio::test]
    async fn json_rpc_errors_become_protocol_errors() {
        let (session, _handle) = session_with(|_, _| None);

        let error = session.list_resources().await.expect_err("listing should fail");

        assert_eq!(error.kind, ToolErrorKind::Protocol);
        assert_eq!(error.server_name.as_deref(), Some("todo"));
        assert!(error.message.contains("no such method"));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (client, _server) = duplex(1024);
        let (reader, writer) = tokio::io::split(client);
        let session = StdioMcpSession::from_streams("slow", reader, writer)
            .with_timeout(Duration::from_millis(20));

        let error = session.list_tools().await.expect_err("listing should time out");

        assert_eq!(error.kind, ToolErrorKind::Timeout);
    }

    #[tokio::test]
    async fn non_stdio_servers_are_rejected() {
        let mut config = McpServerConfig::stdio("remote", "", Vec::new());
        config.server_type = McpServerType::Sse;

        let error = StdioMcpSession::connect(&config)
            .await
            .expect_err("sse should be rejected");

        assert_eq!(error.kind, ToolErrorKind::Transport);
        assert_eq!(error.server_name.as_deref(), Some("remote"));
    }
}
