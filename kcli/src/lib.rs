//! Facade over the kcli workspace crates plus the pieces of the `kcli`
//! binary: YAML configuration, runtime wiring and the clap command surface.
//!
//! ```rust
//! use kcli::prelude::*;
//!
//! let config = KcliConfig::default();
//! assert_eq!(config.provider_id(), Ok(ProviderId::OpenAi));
//! assert_eq!(config.store_options(), ChatStoreOptions::default());
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod prelude;
pub mod runtime;

pub use kchat;
pub use kcommon;
pub use kobserve;
pub use kprovider;
pub use kstore;
pub use ktooling;

pub use kchat::{
    ChatError, ChatErrorKind, ChatService, ConversationEngine, ConversationHooks,
    ConversationStore, EngineSettings, InMemoryConversationStore, SystemPromptComposer,
    TurnReport, TurnStopReason,
};
pub use kcommon::{BoxFuture, ChatId, generate_chat_id};
pub use kobserve::{
    MetricsObservabilityHooks, SafeConversationHooks, SafeProviderHooks, SafeStoreHooks,
    SafeToolHooks, TracingObservabilityHooks,
};
pub use kprovider::{
    CancellationToken, CompletionRequest, Message, ModelProvider, ProviderError,
    ProviderErrorKind, ProviderId, Role, StreamEvent,
};
pub use kstore::{
    ChatFilter, ChatRecord, ChatStore, ChatStoreOptions, McpServerRepository, PromptItem,
    PromptRepository, StoreError, StoreErrorKind,
};
pub use ktooling::mcp::{McpServerConfig, McpSessionManager};
pub use ktooling::{ToolCallResult, ToolError, ToolErrorKind, ToolSession, ToolUseParser};

pub use cli::{Cli, Command, CommandOutput};
pub use config::{ConfigPaths, KcliConfig};
pub use error::{ConfigError, ConfigErrorKind, KcliError, KcliErrorKind};
pub use runtime::{Runtime, build_provider};
