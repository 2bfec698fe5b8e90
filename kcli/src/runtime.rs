//! Wiring from a [`KcliConfig`] to opened stores, a provider and a
//! conversation engine.

use std::sync::Arc;
use std::time::Duration;

use kchat::{ChatService, ConversationEngine, EngineSettings, SystemPromptComposer};
use kobserve::{
    SafeConversationHooks, SafeProviderHooks, SafeStoreHooks, SafeToolHooks,
    TracingObservabilityHooks,
};
use kprovider::{ModelProvider, ProviderError, ProviderId, ProviderOperationHooks};
use kstore::{ChatStore, McpServerRepository, PromptRepository, StoreHooks};
use ktooling::mcp::McpSessionManager;
use reqwest::Client;

use crate::{KcliConfig, KcliError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the configured provider. The API key is only required by the
/// OpenAI-compatible provider.
pub fn build_provider(
    config: &KcliConfig,
    hooks: Arc<dyn ProviderOperationHooks>,
) -> Result<Arc<dyn ModelProvider>, KcliError> {
    let provider_id = config.provider_id()?;
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|err| ProviderError::transport(err.to_string()))?;

    let provider = match provider_id {
        ProviderId::OpenAi => build_openai_provider(config, http, hooks)?,
        ProviderId::Ollama => build_ollama_provider(config, http, hooks)?,
    };
    Ok(provider)
}

#[cfg(feature = "provider-openai")]
fn build_openai_provider(
    config: &KcliConfig,
    http: Client,
    hooks: Arc<dyn ProviderOperationHooks>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    use kprovider::SecretString;
    use kprovider::adapters::http::ReqwestTransport;
    use kprovider::adapters::openai::OpenAiCompatibleProvider;

    let api_key = config.api_key.trim();
    if api_key.is_empty() {
        return Err(ProviderError::authentication(
            "api_key must be set for the OpenAI provider",
        ));
    }

    let transport = Arc::new(ReqwestTransport::new(http));
    Ok(Arc::new(
        OpenAiCompatibleProvider::new(transport, SecretString::new(api_key))
            .with_base_url(config.effective_base_url())
            .with_api_path(config.custom_api_path.as_str())
            .with_hooks(hooks),
    ))
}

#[cfg(not(feature = "provider-openai"))]
fn build_openai_provider(
    _config: &KcliConfig,
    _http: Client,
    _hooks: Arc<dyn ProviderOperationHooks>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    Err(ProviderError::invalid_request(
        "provider-openai feature is not enabled on kcli",
    ))
}

#[cfg(feature = "provider-ollama")]
fn build_ollama_provider(
    config: &KcliConfig,
    http: Client,
    hooks: Arc<dyn ProviderOperationHooks>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    use kprovider::adapters::http::ReqwestTransport;
    use kprovider::adapters::ollama::OllamaProvider;

    let transport = Arc::new(ReqwestTransport::new(http));
    Ok(Arc::new(
        OllamaProvider::new(transport)
            .with_base_url(config.effective_base_url())
            .with_hooks(hooks),
    ))
}

#[cfg(not(feature = "provider-ollama"))]
fn build_ollama_provider(
    _config: &KcliConfig,
    _http: Client,
    _hooks: Arc<dyn ProviderOperationHooks>,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    Err(ProviderError::invalid_request(
        "provider-ollama feature is not enabled on kcli",
    ))
}

/// Opened repositories plus the MCP session manager for one process.
///
/// The provider is only built when an engine is requested, so commands that
/// only touch stored chats work without credentials.
pub struct Runtime {
    config: KcliConfig,
    store: Arc<ChatStore>,
    prompts: PromptRepository,
    servers: McpServerRepository,
    tools: Arc<McpSessionManager>,
}

impl Runtime {
    pub async fn start(config: KcliConfig) -> Result<Self, KcliError> {
        config.validate()?;
        if !config.stream {
            tracing::warn!(
                phase = "config",
                event = "stream_forced",
                "non-streaming completions are not supported, streaming anyway"
            );
        }

        let paths = config.paths()?;
        let store_hooks: Arc<dyn StoreHooks> =
            Arc::new(SafeStoreHooks::new(TracingObservabilityHooks));

        let store = ChatStore::open_with(
            &paths.chats,
            config.store_options(),
            Arc::clone(&store_hooks),
        )
        .await?;
        let prompts =
            PromptRepository::open_with_hooks(&paths.prompts, Arc::clone(&store_hooks)).await?;
        prompts.ensure_defaults().await?;
        let servers = McpServerRepository::open_with_hooks(&paths.mcp_servers, store_hooks).await?;
        servers.ensure_defaults().await?;

        let tools = McpSessionManager::new()
            .with_hooks(Arc::new(SafeToolHooks::new(TracingObservabilityHooks)));

        Ok(Self {
            config,
            store: Arc::new(store),
            prompts,
            servers,
            tools: Arc::new(tools),
        })
    }

    pub fn config(&self) -> &KcliConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptRepository {
        &self.prompts
    }

    pub fn servers(&self) -> &McpServerRepository {
        &self.servers
    }

    pub fn chats(&self) -> ChatService {
        ChatService::new(Arc::clone(&self.store) as Arc<dyn kchat::ConversationStore>)
    }

    /// Connects every active MCP server and returns how many came up.
    pub async fn connect_tools(&self) -> Result<usize, KcliError> {
        let active = self.servers.active()?;
        Ok(self.tools.connect_all(&active).await?)
    }

    pub fn engine(&self) -> Result<ConversationEngine, KcliError> {
        let provider = build_provider(
            &self.config,
            Arc::new(SafeProviderHooks::new(TracingObservabilityHooks)),
        )?;
        self.engine_with_provider(provider)
    }

    /// Builds an engine over an already constructed provider.
    pub fn engine_with_provider(
        &self,
        provider: Arc<dyn ModelProvider>,
    ) -> Result<ConversationEngine, KcliError> {
        let composer = SystemPromptComposer::from_repository(&self.prompts)?;
        let mut settings = EngineSettings::new(self.config.model.as_str())
            .with_max_turns(self.config.max_turns)
            .with_max_tokens(self.config.max_tokens);
        if !self.config.reasoning_effort.trim().is_empty() {
            settings = settings.with_reasoning_effort(self.config.reasoning_effort.trim());
        }

        Ok(ConversationEngine::new(
            provider,
            Arc::clone(&self.tools) as Arc<dyn ktooling::ToolSession>,
            self.chats(),
            settings,
        )
        .with_composer(composer)
        .with_hooks(Arc::new(SafeConversationHooks::new(
            TracingObservabilityHooks,
        ))))
    }

    /// Drains the chat store and closes every MCP session.
    pub async fn shutdown(&self) -> Result<(), KcliError> {
        self.store.shutdown().await;
        self.tools.close_all().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("store", &self.store.path())
            .field("prompts", &self.prompts)
            .field("servers", &self.servers)
            .field("tool_sessions", &self.tools.session_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KcliErrorKind;
    use kprovider::NoopOperationHooks;

    #[test]
    fn openai_provider_requires_an_api_key() {
        let error = build_provider(&KcliConfig::default(), Arc::new(NoopOperationHooks))
            .err().expect("missing key should fail");
        assert_eq!(error.kind, KcliErrorKind::Provider);
    }

    #[test]
    fn providers_are_built_from_config() {
        let openai = KcliConfig {
            api_key: "sk-test".to_string(),
            ..KcliConfig::default()
        };
        let provider =
            build_provider(&openai, Arc::new(NoopOperationHooks)).expect("openai provider");
        assert_eq!(provider.id(), ProviderId::OpenAi);

        let ollama = KcliConfig {
            provider: "Ollama".to_string(),
            ..KcliConfig::default()
        };
        let provider =
            build_provider(&ollama, Arc::new(NoopOperationHooks)).expect("ollama provider");
        assert_eq!(provider.id(), ProviderId::Ollama);
    }

    #[test]
    fn unknown_providers_are_config_errors() {
        let config = KcliConfig {
            provider: "Taiji".to_string(),
            ..KcliConfig::default()
        };
        let error = build_provider(&config, Arc::new(NoopOperationHooks))
            .err().expect("unknown provider should fail");
        assert_eq!(error.kind, KcliErrorKind::Config);
    }
}
