//! Common imports for kcli applications.

pub use crate::{
    CancellationToken, ChatError, ChatFilter, ChatId, ChatRecord, ChatService, ChatStore,
    ChatStoreOptions, Cli, Command, CommandOutput, ConfigError, ConversationEngine,
    EngineSettings, KcliConfig, KcliError, Message, ModelProvider, ProviderError, ProviderId,
    Role, Runtime, StoreError, ToolError, TurnReport, TurnStopReason, build_provider,
};
