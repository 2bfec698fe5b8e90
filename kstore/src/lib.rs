//! File-backed repositories: the worker-pool chat store plus the prompt and
//! MCP server JSONL repositories.
//!
//! ```rust
//! use kprovider::Message;
//! use kstore::{ChatFilter, ChatRecord};
//!
//! let record = ChatRecord::new("a1b2c3", vec![Message::system("rules"), Message::user("hello")]);
//!
//! assert_eq!(record.messages.len(), 1);
//! assert!(ChatFilter::new().with_keyword("HELLO").matches(&record));
//! ```

mod chat_store;
mod error;
mod files;
mod hooks;
mod named;
mod record;

pub mod prelude {
    pub use crate::{
        ChatFilter, ChatRecord, ChatStore, ChatStoreOptions, McpServerRepository, PromptItem,
        PromptRepository, StoreError, StoreErrorKind,
    };
}

pub use chat_store::{
    ChatStore, ChatStoreOptions, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT, OperationRequest,
    PendingResponse,
};
pub use error::{StoreError, StoreErrorKind};
pub use files::{ensure_file, expand_user};
pub use hooks::{NoopStoreHooks, StoreHooks, StoreOperation};
pub use named::{
    DEEP_RESEARCH_PROMPT, DEEP_RESEARCH_PROMPT_NAME, JsonlRepository, MCP_PROMPT, MCP_PROMPT_NAME,
    McpServerRepository, NamedRecord, PromptItem, PromptRepository,
};
pub use record::{ChatFilter, ChatRecord};
