#![cfg(feature = "provider-ollama")]

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use kprovider::adapters::http::{HttpStreamRequest, StreamingTransport};
use kprovider::adapters::ollama::OllamaProvider;
use kprovider::{
    ByteStream, CancellationToken, CompletionRequest, Message, ModelProvider, ProviderError,
    ProviderErrorKind, ProviderFuture, ProviderId, StreamEvent,
};

#[derive(Debug, Default)]
struct FakeTransport {
    body: Vec<Result<&'static str, ProviderError>>,
    captured: Mutex<Option<HttpStreamRequest>>,
}

impl StreamingTransport for FakeTransport {
    fn open<'a>(
        &'a self,
        request: HttpStreamRequest,
    ) -> ProviderFuture<'a, Result<ByteStream<'a>, ProviderError>> {
        Box::pin(async move {
            *self.captured.lock().expect("captured lock") = Some(request);
            let chunks = self
                .body
                .iter()
                .map(|chunk| chunk.clone().map(|text| text.as_bytes().to_vec()))
                .collect::<Vec<_>>();
            Ok(Box::pin(futures_util::stream::iter(chunks)) as ByteStream<'a>)
        })
    }
}

#[tokio::test]
async fn ollama_stream_decodes_ndjson_until_done() {
    let transport = Arc::new(FakeTransport {
        body: vec![
            Ok("{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n"),
            Ok("{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n"),
        ],
        ..FakeTransport::default()
    });
    let provider = OllamaProvider::new(transport.clone());
    assert_eq!(provider.id(), ProviderId::Ollama);

    let events = provider
        .stream_completion(
            CompletionRequest::new("llama3.2", vec![Message::user("hello")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream should open")
        .collect::<Vec<_>>()
        .await;

    let model = Some("llama3.2".to_string());
    assert_eq!(
        events,
        vec![
            Ok(StreamEvent::delta("Hi").with_model(model.clone())),
            Ok(StreamEvent::delta(" there").with_model(model.clone())),
            Ok(StreamEvent::terminal("").with_model(model)),
        ]
    );

    let captured = transport
        .captured
        .lock()
        .expect("captured lock")
        .clone()
        .expect("request should be captured");
    assert_eq!(captured.url, "http://localhost:11434/api/chat");
    assert_eq!(captured.body["messages"][0]["content"], "hello");
}

#[tokio::test]
async fn ollama_read_failure_is_the_last_item() {
    let transport = Arc::new(FakeTransport {
        body: vec![
            Ok("{\"message\":{\"content\":\"partial\"},\"done\":false}\n"),
            Err(ProviderError::transport("connection reset by peer")),
        ],
        ..FakeTransport::default()
    });
    let provider = OllamaProvider::new(transport).with_base_url("http://gpu-box:11434");

    let events = provider
        .stream_completion(
            CompletionRequest::new("llama3.2", vec![Message::user("hello")]),
            CancellationToken::new(),
        )
        .await
        .expect("stream should open")
        .collect::<Vec<_>>()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1].as_ref().map_err(|error| error.kind),
        Err(ProviderErrorKind::Transport)
    );
}
