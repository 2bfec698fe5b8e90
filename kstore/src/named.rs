//! Read-mostly JSONL repositories keyed by name: prompt templates and MCP
//! server definitions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use ktooling::mcp::McpServerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::files::{ensure_file, load_jsonl, write_jsonl};
use crate::{NoopStoreHooks, StoreError, StoreHooks, StoreOperation};

pub const MCP_PROMPT_NAME: &str = "mcp";
pub const DEEP_RESEARCH_PROMPT_NAME: &str = "deep-research";

pub const MCP_PROMPT: &str = "You can use tools provided by connected MCP servers. \
To call a tool, reply with exactly one block in this form and nothing after it:

<use_mcp_tool>
<server_name>server name</server_name>
<tool_name>tool name</tool_name>
<arguments>
{\"argument\": \"value\"}
</arguments>
</use_mcp_tool>

Arguments must be a JSON object matching the tool's input schema. \
Use one tool per message and wait for its result before continuing. \
The connected servers and their tools are listed below.";

pub const DEEP_RESEARCH_PROMPT: &str = "You are a meticulous research assistant. \
Break the question into sub-questions, gather evidence for each one with the \
available tools, note where sources disagree, and finish with a concise answer \
that cites the evidence it rests on.";

/// A record stored once per unique name.
pub trait NamedRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptItem {
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl PromptItem {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl NamedRecord for PromptItem {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NamedRecord for McpServerConfig {
    fn name(&self) -> &str {
        &self.name
    }
}

/// File-backed map from name to record, rewritten sorted by name on every change.
pub struct JsonlRepository<T> {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, T>>,
    persist_lock: tokio::sync::Mutex<()>,
    hooks: Arc<dyn StoreHooks>,
}

pub type PromptRepository = JsonlRepository<PromptItem>;
pub type McpServerRepository = JsonlRepository<McpServerConfig>;

impl<T> std::fmt::Debug for JsonlRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl<T: NamedRecord> JsonlRepository<T> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_hooks(path, Arc::new(NoopStoreHooks)).await
    }

    pub async fn open_with_hooks(
        path: impl AsRef<Path>,
        hooks: Arc<dyn StoreHooks>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        ensure_file(&path).await?;
        let items: Vec<T> =
            load_jsonl(&path, |line, reason| hooks.on_line_skipped(&path, line, reason)).await?;
        hooks.on_loaded(&path, items.len());

        Ok(Self {
            cache: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.name().to_string(), item))
                    .collect(),
            ),
            path,
            persist_lock: tokio::sync::Mutex::new(()),
            hooks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn by_name(&self, name: &str) -> Result<Option<T>, StoreError> {
        if name.is_empty() {
            return Err(StoreError::invalid_input("name is empty"));
        }
        let cache = self.cache.read().map_err(|_| StoreError::poisoned("repository cache"))?;
        Ok(cache.get(name).cloned())
    }

    /// Every record, sorted by name.
    pub fn all(&self) -> Result<Vec<T>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::poisoned("repository cache"))?;
        Ok(cache.values().cloned().collect())
    }

    /// Inserts or replaces by name, returning the replaced record.
    pub async fn upsert(&self, item: T) -> Result<Option<T>, StoreError> {
        let name = item.name().to_string();
        if name.is_empty() {
            return Err(StoreError::invalid_input("name is empty"));
        }

        let _persist = self.persist_lock.lock().await;
        let previous = self.change(|cache| cache.insert(name.clone(), item))?;
        let operation = if previous.is_some() {
            StoreOperation::Update
        } else {
            StoreOperation::Add
        };
        self.persist_or_restore(operation, &name, previous.clone())
            .await?;
        Ok(previous)
    }

    /// Removing an unknown name is a successful no-op returning `false`.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        if name.is_empty() {
            return Err(StoreError::invalid_input("name is empty"));
        }

        let _persist = self.persist_lock.lock().await;
        let Some(previous) = self.change(|cache| cache.remove(name))? else {
            return Ok(false);
        };
        self.persist_or_restore(StoreOperation::Delete, name, Some(previous))
            .await?;
        Ok(true)
    }

    async fn persist_or_restore(
        &self,
        operation: StoreOperation,
        name: &str,
        previous: Option<T>,
    ) -> Result<(), StoreError> {
        let result = match self.all() {
            Ok(items) => write_jsonl(&self.path, &items).await,
            Err(error) => Err(error),
        };
        let Err(error) = result else {
            return Ok(());
        };

        self.change(|cache| match previous {
            Some(previous) => {
                cache.insert(name.to_string(), previous);
            }
            None => {
                cache.remove(name);
            }
        })?;
        self.hooks.on_rollback(operation, name, &error);
        Err(error)
    }

    fn change<R>(&self, change: impl FnOnce(&mut BTreeMap<String, T>) -> R) -> Result<R, StoreError> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| StoreError::poisoned("repository cache"))?;
        Ok(change(&mut cache))
    }
}

impl JsonlRepository<PromptItem> {
    /// Seeds the `mcp` and `deep-research` prompts when they are absent.
    pub async fn ensure_defaults(&self) -> Result<(), StoreError> {
        if self.by_name(MCP_PROMPT_NAME)?.is_none() {
            self.upsert(PromptItem::new(MCP_PROMPT_NAME, MCP_PROMPT).with_description("mcp prompt"))
                .await?;
        }
        if self.by_name(DEEP_RESEARCH_PROMPT_NAME)?.is_none() {
            self.upsert(
                PromptItem::new(DEEP_RESEARCH_PROMPT_NAME, DEEP_RESEARCH_PROMPT)
                    .with_description("deep research prompt"),
            )
            .await?;
        }
        Ok(())
    }
}

impl JsonlRepository<McpServerConfig> {
    /// Seeds the `todo` stdio server when it is absent.
    pub async fn ensure_defaults(&self) -> Result<(), StoreError> {
        let default_server = McpServerConfig::default_server();
        if self.by_name(&default_server.name)?.is_none() {
            self.upsert(default_server).await?;
        }
        Ok(())
    }

    pub fn active(&self) -> Result<Vec<McpServerConfig>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|server| server.is_active)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreErrorKind;

    #[tokio::test]
    async fn defaults_are_seeded_once_and_persisted_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prompts.jsonl");

        let prompts = PromptRepository::open(&path).await.expect("open");
        prompts.ensure_defaults().await.expect("seed");
        prompts
            .upsert(PromptItem::new(MCP_PROMPT_NAME, "custom"))
            .await
            .expect("override");
        prompts.ensure_defaults().await.expect("seed again");

        let reopened = PromptRepository::open(&path).await.expect("reopen");
        let names = reopened
            .all()
            .expect("all")
            .into_iter()
            .map(|item| item.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["deep-research", "mcp"]);
        assert_eq!(
            reopened.by_name("mcp").expect("lookup").map(|item| item.content),
            Some("custom".to_string())
        );
    }

    #[tokio::test]
    async fn mcp_servers_round_trip_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mcp_servers.jsonl");

        let servers = McpServerRepository::open(&path).await.expect("open");
        servers.ensure_defaults().await.expect("seed");
        servers
            .upsert(McpServerConfig::stdio("weather", "node", vec!["weather.js".to_string()]).inactive())
            .await
            .expect("insert");

        assert_eq!(servers.all().expect("all").len(), 2);
        assert_eq!(
            servers
                .active()
                .expect("active")
                .into_iter()
                .map(|server| server.name)
                .collect::<Vec<_>>(),
            vec!["todo"]
        );

        assert!(servers.delete("weather").await.expect("delete"));
        assert!(!servers.delete("weather").await.expect("second delete"));
        assert_eq!(
            servers.by_name("").map_err(|error| error.kind),
            Err(StoreErrorKind::InvalidInput)
        );

        let line = tokio::fs::read_to_string(&path).await.expect("read");
        assert_eq!(
            line,
            "{\"name\":\"todo\",\"type\":\"stdio\",\"isActive\":true,\"command\":\"uvx\",\"args\":[\"mcp-todo\"]}\n"
        );
    }

    #[tokio::test]
    async fn failed_rewrite_restores_the_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("state");
        let path = root.join("prompts.jsonl");
        let prompts = PromptRepository::open(&path).await.expect("open");
        prompts
            .upsert(PromptItem::new("greeting", "hello"))
            .await
            .expect("insert");

        tokio::fs::remove_dir_all(&root).await.expect("remove directory");

        let error = prompts
            .upsert(PromptItem::new("greeting", "changed"))
            .await
            .expect_err("rewrite should fail");
        assert_eq!(error.kind, StoreErrorKind::Storage);
        assert_eq!(
            prompts.by_name("greeting").expect("lookup").map(|item| item.content),
            Some("hello".to_string())
        );

        prompts
            .upsert(PromptItem::new("fresh", "x"))
            .await
            .expect_err("rewrite should fail");
        assert_eq!(prompts.by_name("fresh").expect("lookup"), None);
    }
}
