//! Provider-facing data model, stream decoding, and chat-completion backends.
//!
//! ```rust
//! use kprovider::{Message, Role, StreamEvent};
//!
//! let message = Message::user("hello");
//! let event = StreamEvent::terminal("done");
//!
//! assert_eq!(message.role, Role::User);
//! assert!(event.is_final);
//! ```

pub mod adapters;
pub mod decoder;
pub mod error;
pub mod model;
pub mod prelude;
pub mod provider;
pub mod resilience;
pub mod secret;
pub mod stream;

pub use decoder::{
    ContentPolicy, Decoded, Delta, FramedLine, LineDecoder, LineError, LineFraming, StreamDecoder,
};
pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    CacheControl, CompletionRequest, ContentPart, Message, MessageContent, ProviderId, Role,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use resilience::{NoopOperationHooks, ProviderOperationHooks, RetryPolicy, retry_connect};
pub use secret::SecretString;
pub use stream::{
    AssistantReply, BoxedEventStream, ByteStream, ModelEventStream, StreamEvent, VecEventStream,
    collect_reply,
};
pub use tokio_util::sync::CancellationToken;
