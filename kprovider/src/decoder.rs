//! Line-oriented decoding of streamed completion bodies.
//!
//! A [`LineFraming`] knows the wire shape of one provider: which lines carry
//! data, what the end-of-stream sentinel looks like, and how a payload maps to a
//! [`Delta`]. [`LineDecoder`] applies a framing to raw bytes synchronously and
//! [`StreamDecoder`] drives it over a live body with cancellation.
//!
//! ```rust
//! use kprovider::{ContentPolicy, Delta};
//!
//! let delta = Delta {
//!     content: Some(String::new()),
//!     reasoning: Some("thinking".to_string()),
//!     ..Delta::default()
//! };
//!
//! assert_eq!(ContentPolicy::PrimaryThenReasoning.select(&delta), "thinking");
//! assert_eq!(ContentPolicy::PrimaryOnly.select(&delta), "");
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    BoxedEventStream, ByteStream, NoopOperationHooks, ProviderError, ProviderId,
    ProviderOperationHooks, StreamEvent,
};

/// Classification of one trimmed, non-blank body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramedLine<'a> {
    Skip,
    Sentinel,
    Payload(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// The line is dropped and decoding continues.
    Malformed(String),
    /// The provider reported an error in-band; the stream ends.
    Fatal(ProviderError),
}

/// Provider-neutral view of one payload line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delta {
    pub id: Option<String>,
    pub model: Option<String>,
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub is_final: bool,
}

pub trait LineFraming: Send + Sync {
    fn frame<'a>(&self, line: &'a str) -> FramedLine<'a>;

    fn parse(&self, payload: &str) -> Result<Delta, LineError>;
}

/// Which delta field becomes event content.
///
/// This is a display preference. Some providers stream chain-of-thought in a
/// separate field and leave `content` empty until the answer starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentPolicy {
    /// Primary content when non-empty, otherwise reasoning.
    #[default]
    PrimaryThenReasoning,
    PrimaryOnly,
}

impl ContentPolicy {
    pub fn select(self, delta: &Delta) -> String {
        let primary = delta.content.as_deref().unwrap_or_default();
        match self {
            Self::PrimaryOnly => primary.to_string(),
            Self::PrimaryThenReasoning if !primary.is_empty() => primary.to_string(),
            Self::PrimaryThenReasoning => delta.reasoning.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(StreamEvent),
    Skipped(String),
    Failed(ProviderError),
}

/// Synchronous line splitter and delta decoder.
///
/// After a terminal event or a failure the decoder is finished and ignores
/// further input.
pub struct LineDecoder<F> {
    framing: F,
    policy: ContentPolicy,
    buffer: Vec<u8>,
    finished: bool,
    last_id: Option<String>,
    last_model: Option<String>,
}

impl<F> LineDecoder<F>
where
    F: LineFraming,
{
    pub fn new(framing: F) -> Self {
        Self {
            framing,
            policy: ContentPolicy::default(),
            buffer: Vec::new(),
            finished: false,
            last_id: None,
            last_model: None,
        }
    }

    pub fn with_policy(mut self, policy: ContentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        let mut decoded = Vec::new();
        if self.finished {
            return decoded;
        }

        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            self.decode_line(&line, &mut decoded);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        decoded
    }

    /// Flushes a trailing unterminated line and closes the sequence.
    ///
    /// A body that ends without a sentinel or finish marker still gets exactly
    /// one terminal event.
    pub fn finish(&mut self) -> Vec<Decoded> {
        let mut decoded = Vec::new();
        if self.finished {
            return decoded;
        }

        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut decoded);
        }

        if !self.finished {
            self.finished = true;
            decoded.push(Decoded::Event(self.terminal(String::new())));
        }

        decoded
    }

    fn decode_line(&mut self, raw: &[u8], decoded: &mut Vec<Decoded>) {
        let Ok(text) = std::str::from_utf8(raw) else {
            decoded.push(Decoded::Skipped("line is not valid UTF-8".to_string()));
            return;
        };

        let line = text.trim();
        if line.is_empty() {
            return;
        }

        match self.framing.frame(line) {
            FramedLine::Skip => {}
            FramedLine::Sentinel => {
                self.finished = true;
                decoded.push(Decoded::Event(self.terminal(String::new())));
            }
            FramedLine::Payload(payload) => match self.framing.parse(payload) {
                Err(LineError::Malformed(reason)) => decoded.push(Decoded::Skipped(reason)),
                Err(LineError::Fatal(error)) => {
                    self.finished = true;
                    decoded.push(Decoded::Failed(error));
                }
                Ok(delta) => {
                    if delta.id.is_some() {
                        self.last_id = delta.id.clone();
                    }
                    if delta.model.is_some() {
                        self.last_model = delta.model.clone();
                    }

                    let content = self.policy.select(&delta);
                    let event = if delta.is_final {
                        self.finished = true;
                        self.terminal(content)
                    } else {
                        StreamEvent::delta(content)
                            .with_id(self.last_id.clone())
                            .with_model(self.last_model.clone())
                    };
                    decoded.push(Decoded::Event(event));
                }
            },
        }
    }

    fn terminal(&self, content: String) -> StreamEvent {
        StreamEvent::terminal(content)
            .with_id(self.last_id.clone())
            .with_model(self.last_model.clone())
    }
}

enum Step {
    Cancelled,
    Chunk(Option<Result<Vec<u8>, ProviderError>>),
}

/// Turns a live response body into a [`BoxedEventStream`].
pub struct StreamDecoder<F> {
    provider: ProviderId,
    decoder: LineDecoder<F>,
    hooks: Arc<dyn ProviderOperationHooks>,
}

impl<F> StreamDecoder<F>
where
    F: LineFraming,
{
    pub fn new(provider: ProviderId, framing: F) -> Self {
        Self {
            provider,
            decoder: LineDecoder::new(framing),
            hooks: Arc::new(NoopOperationHooks),
        }
    }

    pub fn with_policy(mut self, policy: ContentPolicy) -> Self {
        self.decoder = self.decoder.with_policy(policy);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn decode<'a>(self, body: ByteStream<'a>, cancel: CancellationToken) -> BoxedEventStream<'a>
    where
        F: 'a,
    {
        let Self {
            provider,
            mut decoder,
            hooks,
        } = self;

        Box::pin(async_stream::stream! {
            let mut body = body;
            let mut emitted = 0_usize;

            loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    chunk = body.next() => Step::Chunk(chunk),
                };

                let batch = match step {
                    Step::Cancelled => vec![Decoded::Failed(ProviderError::cancelled(
                        "stream cancelled while waiting for data",
                    ))],
                    Step::Chunk(None) => decoder.finish(),
                    Step::Chunk(Some(Err(error))) => vec![Decoded::Failed(error)],
                    Step::Chunk(Some(Ok(bytes))) => decoder.feed(&bytes),
                };

                for item in batch {
                    match item {
                        Decoded::Skipped(reason) => hooks.on_stream_line_skipped(provider, &reason),
                        Decoded::Event(event) => {
                            emitted += 1;
                            let is_final = event.is_final;
                            yield Ok(event);
                            if is_final {
                                hooks.on_stream_completed(provider, emitted);
                                return;
                            }
                        }
                        Decoded::Failed(error) => {
                            hooks.on_stream_failed(provider, emitted, &error);
                            yield Err(error);
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::StreamExt;

    use super::*;
    use crate::ProviderErrorKind;

    /// `data: <text>` lines, `data: !<text>` finishes, `data: ?` is malformed.
    struct TestFraming;

    impl LineFraming for TestFraming {
        fn frame<'a>(&self, line: &'a str) -> FramedLine<'a> {
            match line.strip_prefix("data:").map(str::trim) {
                Some("END") => FramedLine::Sentinel,
                Some(payload) => FramedLine::Payload(payload),
                None => FramedLine::Skip,
            }
        }

        fn parse(&self, payload: &str) -> Result<Delta, LineError> {
            match payload {
                "?" => Err(LineError::Malformed("question mark".to_string())),
                "FAIL" => Err(LineError::Fatal(ProviderError::unavailable("overloaded"))),
                _ => Ok(Delta {
                    content: Some(payload.trim_start_matches('!').to_string()),
                    is_final: payload.starts_with('!'),
                    ..Delta::default()
                }),
            }
        }
    }

    fn contents(decoded: &[Decoded]) -> Vec<(String, bool)> {
        decoded
            .iter()
            .filter_map(|item| match item {
                Decoded::Event(event) => Some((event.content.clone(), event.is_final)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut decoder = LineDecoder::new(TestFraming);

        assert!(decoder.feed(b"data: hel").is_empty());
        let decoded = decoder.feed(b"lo\n\n: comment\ndata: world\n");

        assert_eq!(
            contents(&decoded),
            vec![("hello".to_string(), false), ("world".to_string(), false)]
        );
    }

    #[test]
    fn sentinel_produces_one_terminal_event_and_stops() {
        let mut decoder = LineDecoder::new(TestFraming);

        let decoded = decoder.feed(b"data: a\ndata: END\ndata: after\n");
        assert_eq!(
            contents(&decoded),
            vec![("a".to_string(), false), (String::new(), true)]
        );
        assert!(decoder.is_finished());
        assert!(decoder.feed(b"data: more\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut decoder = LineDecoder::new(TestFraming);

        let decoded = decoder.feed(b"data: ?\ndata: ok\n");

        assert_eq!(decoded[0], Decoded::Skipped("question mark".to_string()));
        assert_eq!(contents(&decoded), vec![("ok".to_string(), false)]);
    }

    #[test]
    fn finish_flushes_trailing_line_and_terminates() {
        let mut decoder = LineDecoder::new(TestFraming);

        assert!(decoder.feed(b"data: tail").is_empty());
        let decoded = decoder.finish();

        assert_eq!(
            contents(&decoded),
            vec![("tail".to_string(), false), (String::new(), true)]
        );
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl ProviderOperationHooks for RecordingHooks {
        fn on_stream_line_skipped(&self, _provider: ProviderId, reason: &str) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("skipped:{reason}"));
        }

        fn on_stream_completed(&self, _provider: ProviderId, events: usize) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("completed:{events}"));
        }

        fn on_stream_failed(&self, _provider: ProviderId, events: usize, error: &ProviderError) {
            self.events
                .lock()
                .expect("events lock")
                .push(format!("failed:{events}:{:?}", error.kind));
        }
    }

    fn body(chunks: Vec<Result<&'static str, ProviderError>>) -> ByteStream<'static> {
        Box::pin(futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|chunk| chunk.map(|text| text.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn decode_reports_skips_and_completion_through_hooks() {
        let hooks = Arc::new(RecordingHooks::default());
        let stream = StreamDecoder::new(ProviderId::OpenAi, TestFraming)
            .with_hooks(hooks.clone())
            .decode(
                body(vec![Ok("data: ?\ndata: hi\n"), Ok("data: !bye\n")]),
                CancellationToken::new(),
            );

        let items = stream.collect::<Vec<_>>().await;

        assert_eq!(
            items,
            vec![Ok(StreamEvent::delta("hi")), Ok(StreamEvent::terminal("bye"))]
        );
        assert_eq!(
            hooks.events.lock().expect("events lock").clone(),
            vec!["skipped:question mark".to_string(), "completed:2".to_string()]
        );
    }

    #[tokio::test]
    async fn transport_failure_ends_stream_with_single_error() {
        let items = StreamDecoder::new(ProviderId::OpenAi, TestFraming)
            .decode(
                body(vec![
                    Ok("data: partial\n"),
                    Err(ProviderError::transport("connection reset")),
                    Ok("data: unreachable\n"),
                ]),
                CancellationToken::new(),
            )
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(StreamEvent::delta("partial")));
        assert_eq!(
            items[1].as_ref().map_err(|error| error.kind),
            Err(ProviderErrorKind::Transport)
        );
    }

    #[tokio::test]
    async fn in_band_error_is_fatal() {
        let items = StreamDecoder::new(ProviderId::OpenAi, TestFraming)
            .decode(body(vec![Ok("data: FAIL\ndata: x\n")]), CancellationToken::new())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items, vec![Err(ProviderError::unavailable("overloaded"))]);
    }

    #[tokio::test]
    async fn cancellation_while_waiting_yields_cancelled_error() {
        let cancel = CancellationToken::new();
        let pending: ByteStream<'static> =
            Box::pin(futures_util::stream::pending::<Result<Vec<u8>, ProviderError>>());
        let mut stream =
            StreamDecoder::new(ProviderId::Ollama, TestFraming).decode(pending, cancel.clone());

        cancel.cancel();
        let first = stream.next().await.expect("an item should be produced");

        assert!(first.expect_err("cancellation should surface as error").is_cancelled());
        assert!(stream.next().await.is_none());
    }
}
