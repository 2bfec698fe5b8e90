//! Conversation orchestration: the tool-use turn loop, system prompt
//! composition and record-level chat operations.
//!
//! ```rust
//! use kchat::{EngineSettings, TurnStopReason};
//!
//! let settings = EngineSettings::new("deepseek/deepseek-chat-v3.1:free").with_max_turns(4);
//!
//! assert_eq!(settings.max_turns, 4);
//! assert_eq!(TurnStopReason::Completed.as_str(), "completed");
//! ```

mod engine;
mod error;
mod hooks;
mod prompt;
mod service;
mod store;

pub mod prelude {
    pub use crate::{
        ChatError, ChatErrorKind, ChatService, ConversationEngine, ConversationHooks,
        ConversationStore, EngineSettings, InMemoryConversationStore, SystemPromptComposer,
        TurnReport, TurnStopReason,
    };
    pub use kcommon::ChatId;
    pub use kprovider::CancellationToken;
}

pub use engine::{ConversationEngine, DEFAULT_MAX_TURNS, EngineSettings, TurnReport, TurnStopReason};
pub use error::{ChatError, ChatErrorKind};
pub use hooks::{ConversationHooks, NoopConversationHooks};
pub use prompt::{SystemPromptComposer, TIME_PROMPT_PREFIX};
pub use service::ChatService;
pub use store::{ChatFuture, ConversationStore, InMemoryConversationStore};
