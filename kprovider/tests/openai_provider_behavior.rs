#![cfg(feature = "provider-openai")]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use kprovider::adapters::http::{HttpStreamRequest, StreamingTransport};
use kprovider::adapters::openai::OpenAiCompatibleProvider;
use kprovider::{
    ByteStream, CancellationToken, CompletionRequest, ContentPolicy, Message, ModelProvider,
    ProviderError, ProviderErrorKind, ProviderFuture, RetryPolicy, SecretString, StreamEvent,
    collect_reply,
};

#[derive(Debug, Default)]
struct FakeTransport {
    chunks: Vec<&'static str>,
    failures_before_success: Mutex<u32>,
    captured: Mutex<Vec<HttpStreamRequest>>,
}

impl FakeTransport {
    fn with_chunks(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }
}

impl StreamingTransport for FakeTransport {
    fn open<'a>(
        &'a self,
        request: HttpStreamRequest,
    ) -> ProviderFuture<'a, Result<ByteStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.captured.lock().expect("captured lock").push(request);

            let mut failures = self.failures_before_success.lock().expect("failures lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::unavailable("503 upstream"));
            }

            let chunks = self
                .chunks
                .iter()
                .map(|chunk| Ok(chunk.as_bytes().to_vec()))
                .collect::<Vec<_>>();
            Ok(Box::pin(futures_util::stream::iter(chunks)) as ByteStream<'a>)
        })
    }
}

fn provider(transport: Arc<FakeTransport>) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(transport, SecretString::new("sk-test"))
        .with_base_url("https://example.test/api/")
        .with_retry_policy(RetryPolicy {
            initial_backoff: std::time::Duration::from_millis(1),
            ..RetryPolicy::new(3)
        })
}

#[tokio::test]
async fn stream_completion_posts_framed_request_and_decodes_sse() {
    let transport = Arc::new(FakeTransport::with_chunks(vec![
        ": OPENROUTER PROCESSING\n\n",
        "data: {\"id\":\"gen-1\",\"model\":\"m\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"id\":\"gen-1\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"Hel",
        "lo\"}}]}\n\ndata: {\"id\":\"gen-1\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"!\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    ]));
    let provider = provider(transport.clone());
    let request = CompletionRequest::new("m", vec![Message::user("hi")]).with_system_prompt("sys");

    let stream = provider
        .stream_completion(request, CancellationToken::new())
        .await
        .expect("stream should open");
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[2],
        Ok(StreamEvent::terminal("!")
            .with_id(Some("gen-1".to_string()))
            .with_model(Some("m".to_string())))
    );

    let captured = transport.captured.lock().expect("captured lock");
    assert_eq!(captured[0].url, "https://example.test/api/v1/chat/completions");
    assert!(
        captured[0]
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-test".to_string()))
    );
    assert!(
        captured[0]
            .headers
            .iter()
            .any(|(name, _)| name == "HTTP-Referer")
    );
    assert_eq!(captured[0].body["messages"][0]["role"], "system");
    assert_eq!(captured[0].body["stream"], true);
}

#[tokio::test]
async fn collect_reply_assembles_content_after_empty_first_chunk() {
    let transport = Arc::new(FakeTransport::with_chunks(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
        "data: {not json}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n",
        "data: [DONE]\n",
    ]));
    let provider = provider(transport);

    let stream = provider
        .stream_completion(
            CompletionRequest::new("m", vec![Message::user("q")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream should open");
    let reply = collect_reply(stream).await.expect("reply should succeed");

    assert_eq!(reply.map(|reply| reply.content), Some("answer".to_string()));
}

#[tokio::test]
async fn reasoning_is_shown_only_under_fallback_policy() {
    let chunks = vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"\",\"reasoning_content\":\"thinking\"}}]}\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"done\"},\"finish_reason\":\"stop\"}]}\n",
    ];

    let fallback = provider(Arc::new(FakeTransport::with_chunks(chunks.clone())));
    let primary_only = provider(Arc::new(FakeTransport::with_chunks(chunks)))
        .with_content_policy(ContentPolicy::PrimaryOnly);

    let request = CompletionRequest::new("m", vec![Message::user("q")]);
    let with_reasoning = collect_reply(
        fallback
            .stream_completion(request.clone(), CancellationToken::new())
            .await
            .expect("stream should open"),
    )
    .await
    .expect("reply should succeed")
    .expect("reply should exist");
    let without_reasoning = collect_reply(
        primary_only
            .stream_completion(request, CancellationToken::new())
            .await
            .expect("stream should open"),
    )
    .await
    .expect("reply should succeed")
    .expect("reply should exist");

    assert_eq!(with_reasoning.content, "thinkingdone");
    assert_eq!(without_reasoning.content, "done");
}

#[tokio::test]
async fn connection_failures_are_retried_by_the_provider() {
    let transport = Arc::new(FakeTransport::with_chunks(vec!["data: [DONE]\n"]));
    *transport.failures_before_success.lock().expect("failures lock") = 2;
    let provider = provider(transport.clone());

    let stream = provider
        .stream_completion(
            CompletionRequest::new("m", vec![Message::user("q")]),
            CancellationToken::new(),
        )
        .await
        .expect("third attempt should open");
    let events = stream.collect::<Vec<_>>().await;

    assert_eq!(events, vec![Ok(StreamEvent::terminal(""))]);
    assert_eq!(transport.captured.lock().expect("captured lock").len(), 3);
}

#[tokio::test]
async fn cancelled_token_stops_before_connecting() {
    let transport = Arc::new(FakeTransport::with_chunks(vec!["data: [DONE]\n"]));
    let provider = provider(transport);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = match provider
        .stream_completion(CompletionRequest::new("m", vec![Message::user("q")]), cancel)
        .await
    {
        Ok(_) => panic!("cancelled request should not open"),
        Err(error) => error,
    };

    assert_eq!(error.kind, ProviderErrorKind::Cancelled);
}
