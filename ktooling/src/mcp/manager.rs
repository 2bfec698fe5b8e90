//! Connects every active MCP server and routes tool calls by tool name.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use kcommon::Registry;
use serde_json::{Map, Value};

use super::{McpServerConfig, StdioMcpSession};
use crate::{
    NoopToolRuntimeHooks, ResourceDescriptor, ResourceTemplateDescriptor, ServerCatalog,
    ToolCallResult, ToolCatalog, ToolDescriptor, ToolError, ToolFuture, ToolRuntimeHooks,
    ToolSession,
};

/// Opens a session for one server configuration.
pub trait SessionConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        config: &'a McpServerConfig,
    ) -> ToolFuture<'a, Result<Arc<dyn ToolSession>, ToolError>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdioConnector;

impl SessionConnector for StdioConnector {
    fn connect<'a>(
        &'a self,
        config: &'a McpServerConfig,
    ) -> ToolFuture<'a, Result<Arc<dyn ToolSession>, ToolError>> {
        Box::pin(async move {
            let session = StdioMcpSession::connect(config).await?;
            Ok(Arc::new(session) as Arc<dyn ToolSession>)
        })
    }
}

#[derive(Default)]
struct ManagerState {
    sessions: Registry<String, Arc<dyn ToolSession>>,
    routes: Registry<String, String>,
    catalog: ToolCatalog,
}

pub struct McpSessionManager {
    state: RwLock<ManagerState>,
    connector: Arc<dyn SessionConnector>,
    hooks: Arc<dyn ToolRuntimeHooks>,
}

impl Default for McpSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpSessionManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState::default()),
            connector: Arc::new(StdioConnector),
            hooks: Arc::new(NoopToolRuntimeHooks),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces all sessions with fresh connections to the active servers.
    ///
    /// A server that cannot be reached is reported through the hooks and
    /// skipped. When two servers expose the same tool name, the first one
    /// listed owns it. Returns the number of connected servers.
    pub async fn connect_all(&self, configs: &[McpServerConfig]) -> Result<usize, ToolError> {
        self.close_all().await?;

        let mut next = ManagerState::default();
        for config in configs.iter().filter(|config| config.is_active) {
            let session = match self.connector.connect(config).await {
                Ok(session) => session,
                Err(error) => {
                    self.hooks.on_server_failed(&config.name, &error);
                    continue;
                }
            };

            let mut server = ServerCatalog::new(config.name.as_str());
            match session.list_tools().await {
                Ok(tools) => server.tools = tools,
                Err(error) => self.hooks.on_server_failed(&config.name, &error),
            }
            // Resource listings are optional capabilities.
            server.resources = session.list_resources().await.unwrap_or_default();
            server.resource_templates = session.list_resource_templates().await.unwrap_or_default();

            for tool in &server.tools {
                if !next.routes.contains_key(tool.name.as_str()) {
                    next.routes.insert(tool.name.clone(), config.name.clone());
                }
            }
            self.hooks.on_server_connected(&config.name, server.tools.len());
            next.catalog.push(server);
            next.sessions.insert(config.name.clone(), session);
        }

        let connected = next.sessions.len();
        *self
            .state
            .write()
            .map_err(|_| ToolError::other("session registry lock poisoned"))? = next;
        Ok(connected)
    }

    /// Registers an already-open session under `server`.
    pub async fn attach(&self, server: impl Into<String>, session: Arc<dyn ToolSession>) -> Result<(), ToolError> {
        let server = server.into();
        let mut catalog = ServerCatalog::new(server.as_str());
        catalog.tools = session.list_tools().await?;

        let mut state = self
            .state
            .write()
            .map_err(|_| ToolError::other("session registry lock poisoned"))?;
        for tool in &catalog.tools {
            if !state.routes.contains_key(tool.name.as_str()) {
                state.routes.insert(tool.name.clone(), server.clone());
            }
        }
        state.catalog.push(catalog);
        state.sessions.insert(server, session);
        Ok(())
    }

    pub fn server_for_tool(&self, tool: &str) -> Option<String> {
        self.state.read().ok()?.routes.get(tool).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.read().map(|state| state.sessions.len()).unwrap_or_default()
    }

    pub async fn close_all(&self) -> Result<(), ToolError> {
        let sessions = {
            let mut state = self
                .state
                .write()
                .map_err(|_| ToolError::other("session registry lock poisoned"))?;
            state.routes = Registry::new();
            state.catalog = ToolCatalog::default();
            state.sessions.drain().map(|(_, session)| session).collect::<Vec<_>>()
        };

        for session in sessions {
            session.close().await;
        }
        Ok(())
    }

    fn route(&self, tool: &str) -> Result<(String, Arc<dyn ToolSession>), ToolError> {
        let state = self
            .state
            .read()
            .map_err(|_| ToolError::other("session registry lock poisoned"))?;
        let server = state.routes.get(tool).ok_or_else(|| {
            ToolError::not_found(format!("tool '{tool}' not found on any connected server"))
                .with_tool_name(tool)
        })?;
        let session = state.sessions.get(server.as_str()).ok_or_else(|| {
            ToolError::not_found(format!("server '{server}' is not connected"))
                .with_server_name(server)
                .with_tool_name(tool)
        })?;
        Ok((server.clone(), Arc::clone(session)))
    }
}

impl ToolSession for McpSessionManager {
    fn call_tool<'a>(
        &'a self,
        name: &'a str,
        arguments: Map<String, Value>,
    ) -> ToolFuture<'a, Result<ToolCallResult, ToolError>> {
        Box::pin(async move {
            let (server, session) = self.route(name)?;
            self.hooks.on_execution_start(&server, name);
            let started = Instant::now();

            match session.call_tool(name, arguments).await {
                Ok(result) => {
                    self.hooks
                        .on_execution_success(&server, name, &result, started.elapsed());
                    Ok(result)
                }
                Err(error) => {
                    let error = error.with_server_name(server.as_str()).with_tool_name(name);
                    self.hooks
                        .on_execution_failure(&server, name, &error, started.elapsed());
                    Err(error)
                }
            }
        })
    }

    fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ToolDescriptor>, ToolError>> {
        let catalog = self.catalog();
        Box::pin(async move {
            Ok(catalog
                .servers()
                .iter()
                .flat_map(|server| server.tools.iter().cloned())
                .collect())
        })
    }

    fn list_resources<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ResourceDescriptor>, ToolError>> {
        let catalog = self.catalog();
        Box::pin(async move {
            Ok(catalog
                .servers()
                .iter()
                .flat_map(|server| server.resources.iter().cloned())
                .collect())
        })
    }

    fn list_resource_templates<'a>(
        &'a self,
    ) -> ToolFuture<'a, Result<Vec<ResourceTemplateDescriptor>, ToolError>> {
        let catalog = self.catalog();
        Box::pin(async move {
            Ok(catalog
                .servers()
                .iter()
                .flat_map(|server| server.resource_templates.iter().cloned())
                .collect())
        })
    }

    fn catalog(&self) -> ToolCatalog {
        self.state
            .read()
            .map(|state| state.catalog.clone())
            .unwrap_or_default()
    }

    fn close<'a>(&'a self) -> ToolFuture<'a, ()> {
        Box::pin(async move {
            let _ = self.close_all().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{ToolErrorKind, ToolContent};

    #[derive(Default)]
    struct FakeSession {
        tools: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
        closed: Mutex<bool>,
    }

    impl ToolSession for FakeSession {
        fn call_tool<'a>(
            &'a self,
            name: &'a str,
            arguments: Map<String, Value>,
        ) -> ToolFuture<'a, Result<ToolCallResult, ToolError>> {
            Box::pin(async move {
                self.calls.lock().expect("calls lock").push(name.to_string());
                if name == "explode" {
                    return Err(ToolError::execution("boom"));
                }
                Ok(ToolCallResult::text(Value::Object(arguments).to_string()))
            })
        }

        fn list_tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<ToolDescriptor>, ToolError>> {
            Box::pin(async move {
                Ok(self
                    .tools
                    .iter()
                    .map(|name| ToolDescriptor {
                        name: name.to_string(),
                        description: String::new(),
                        input_schema: json!({}),
                    })
                    .collect())
            })
        }

        fn close<'a>(&'a self) -> ToolFuture<'a, ()> {
            Box::pin(async move {
                *self.closed.lock().expect("closed lock") = true;
            })
        }
    }

    struct FakeConnector {
        sessions: Mutex<Vec<(String, Arc<FakeSession>)>>,
    }

    impl FakeConnector {
        fn new(sessions: Vec<(&str, Arc<FakeSession>)>) -> Self {
            Self {
                sessions: Mutex::new(
                    sessions
                        .into_iter()
                        .map(|(name, session)| (name.to_string(), session))
                        .collect(),
                ),
            }
        }
    }

    impl SessionConnector for FakeConnector {
        fn connect<'a>(
            &'a self,
            config: &'a McpServerConfig,
        ) -> ToolFuture<'a, Result<Arc<dyn ToolSession>, ToolError>> {
            Box::pin(async move {
                let sessions = self.sessions.lock().expect("sessions lock");
                sessions
                    .iter()
                    .find(|(name, _)| name == &config.name)
                    .map(|(_, session)| Arc::clone(session) as Arc<dyn ToolSession>)
                    .ok_or_else(|| ToolError::transport("connection refused"))
            })
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl ToolRuntimeHooks for RecordingHooks {
        fn on_server_connected(&self, server: &str, tools: usize) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("connected:{server}:{tools}"));
        }

        fn on_server_failed(&self, server: &str, _error: &ToolError) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("failed:{server}"));
        }

        fn on_execution_success(
            &self,
            server: &str,
            tool: &str,
            _result: &ToolCallResult,
            _elapsed: Duration,
        ) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("ok:{server}:{tool}"));
        }

        fn on_execution_failure(&self, server: &str, tool: &str, _error: &ToolError, _elapsed: Duration) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("err:{server}:{tool}"));
        }
    }

    fn config(name: &str) -> McpServerConfig {
        McpServerConfig::stdio(name, "unused", Vec::new())
    }

    #[tokio::test]
    async fn calls_are_routed_to_the_owning_server() {
        let todo = Arc::new(FakeSession {
            tools: vec!["add_task", "explode"],
            ..FakeSession::default()
        });
        let weather = Arc::new(FakeSession {
            tools: vec!["forecast", "add_task"],
            ..FakeSession::default()
        });
        let hooks = Arc::new(RecordingHooks::default());
        let manager = McpSessionManager::new()
            .with_connector(Arc::new(FakeConnector::new(vec![
                ("todo", Arc::clone(&todo)),
                ("weather", Arc::clone(&weather)),
            ])))
            .with_hooks(hooks.clone());

        let connected = manager
            .connect_all(&[config("todo"), config("weather"), config("offline"), config("idle").inactive()])
            .await
            .expect("connect should succeed");
        assert_eq!(connected, 2);

        let mut arguments = Map::new();
        arguments.insert("city".to_string(), json!("Oslo"));
        let result = manager
            .call_tool("forecast", arguments)
            .await
            .expect("forecast should succeed");
        assert_eq!(result.content, vec![ToolContent::text("{\"city\":\"Oslo\"}")]);

        manager
            .call_tool("add_task", Map::new())
            .await
            .expect("add_task should succeed");
        assert_eq!(todo.calls.lock().expect("calls lock").as_slice(), ["add_task"]);
        assert_eq!(weather.calls.lock().expect("calls lock").as_slice(), ["forecast"]);

        let error = manager
            .call_tool("explode", Map::new())
            .await
            .expect_err("explode should fail");
        assert_eq!(error.server_name.as_deref(), Some("todo"));

        assert_eq!(
            hooks.events.lock().expect("events lock").as_slice(),
            [
                "connected:todo:2",
                "connected:weather:2",
                "failed:offline",
                "ok:weather:forecast",
                "ok:todo:add_task",
                "err:todo:explode",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tools_are_not_found_and_close_all_clears_routes() {
        let todo = Arc::new(FakeSession {
            tools: vec!["add_task"],
            ..FakeSession::default()
        });
        let manager = McpSessionManager::new()
            .with_connector(Arc::new(FakeConnector::new(vec![("todo", Arc::clone(&todo))])));
        manager
            .connect_all(&[config("todo")])
            .await
            .expect("connect should succeed");

        let error = manager
            .call_tool("missing", Map::new())
            .await
            .expect_err("missing tool should fail");
        assert_eq!(error.kind, ToolErrorKind::NotFound);
        assert!(manager.catalog().render().contains("- add_task"));

        manager.close_all().await.expect("close should succeed");

        assert!(*todo.closed.lock().expect("closed lock"));
        assert_eq!(manager.session_count(), 0);
        assert_eq!(manager.server_for_tool("add_task"), None);
        assert!(manager.catalog().is_empty());
    }
}
