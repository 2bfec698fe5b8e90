//! Common `kprovider` imports for downstream crates.

pub use crate::{
    AssistantReply, BoxedEventStream, CancellationToken, CompletionRequest, ContentPart,
    Message, MessageContent, ModelEventStream, ModelProvider, NoopOperationHooks, ProviderError,
    ProviderErrorKind, ProviderId, ProviderOperationHooks, RetryPolicy, Role, StreamEvent,
    collect_reply,
};
pub use kcommon::BoxFuture;
