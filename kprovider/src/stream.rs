//! Streaming event contracts, in-memory streams, and reply assembly.
//!
//! ```rust
//! use kprovider::{BoxedEventStream, StreamEvent, VecEventStream};
//!
//! let stream = VecEventStream::new(vec![Ok(StreamEvent::terminal("hello"))]);
//! let _boxed: BoxedEventStream<'static> = Box::pin(stream);
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::ProviderError;

/// One decoded increment of a live model response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamEvent {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: String,
    pub is_final: bool,
}

impl StreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn terminal(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: true,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Provider stream contract.
///
/// Invariants for consumers:
/// - Events are emitted in source order.
/// - The sequence ends with exactly one terminal event (`is_final`) or exactly one `Err` item.
/// - Once the stream yields `None`, it must not yield additional items.
pub trait ModelEventStream: Stream<Item = Result<StreamEvent, ProviderError>> + Send {}

impl<T> ModelEventStream for T where T: Stream<Item = Result<StreamEvent, ProviderError>> + Send {}

pub type BoxedEventStream<'a> = Pin<Box<dyn ModelEventStream + 'a>>;

/// Raw response body chunks as delivered by a transport.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ProviderError>> + Send + 'a>>;

#[derive(Debug)]
pub struct VecEventStream {
    events: VecDeque<Result<StreamEvent, ProviderError>>,
}

impl VecEventStream {
    pub fn new(events: Vec<Result<StreamEvent, ProviderError>>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl Stream for VecEventStream {
    type Item = Result<StreamEvent, ProviderError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<StreamEvent, ProviderError>>> {
        Poll::Ready(self.events.pop_front())
    }
}

/// Assembled assistant output of one completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssistantReply {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: String,
}

/// Drains a stream into a single reply.
///
/// Leading empty chunks are skipped. A stream that ends or finishes before any
/// content arrives yields `Ok(None)`. An error item aborts with `Err` even when
/// partial content was already received.
pub async fn collect_reply(
    mut stream: BoxedEventStream<'_>,
) -> Result<Option<AssistantReply>, ProviderError> {
    let mut reply: Option<AssistantReply> = None;

    while let Some(item) = stream.next().await {
        let event = item?;
        match reply.as_mut() {
            None if event.content.is_empty() => {}
            None => {
                reply = Some(AssistantReply {
                    id: event.id.clone(),
                    model: event.model.clone(),
                    content: event.content.clone(),
                });
            }
            Some(existing) => {
                existing.content.push_str(&event.content);
                if existing.id.is_none() {
                    existing.id = event.id.clone();
                }
                if existing.model.is_none() {
                    existing.model = event.model.clone();
                }
            }
        }

        if event.is_final {
            break;
        }
    }

    Ok(reply)
}
