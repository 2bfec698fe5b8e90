use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::{BoxedEventStream, CompletionRequest, ProviderError, ProviderId};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat-completion backend.
///
/// Implementations must honor the [`crate::ModelEventStream`] contract: the
/// returned stream ends with exactly one terminal event or exactly one error,
/// and a cancelled `cancel` token surfaces as a `Cancelled` error item.
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn stream_completion<'a>(
        &'a self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>>;
}
