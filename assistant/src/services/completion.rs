//! Streaming completions and their re-framing into the chat wire protocol.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use storefront_config::CompletionSettings;
use storefront_models::{encode_frame, ChatMessage, ProductCard, StreamEvent};
use storefront_observability::log_external_call;

use crate::errors::{AssistantError, AssistantResult};

const SERVICE: &str = "completion";

/// Incremental completion tokens in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = AssistantResult<String>> + Send>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Opens a streamed completion. Errors before the first token (bad
    /// credential, unreachable service) are returned here; errors after it
    /// arrive as stream items.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> AssistantResult<TokenStream>;
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIStreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Token(String),
    Done,
    Failed(String),
    Skip,
}

/// Interprets one server-sent-events line of a chat completion stream.
fn parse_sse_line(line: &[u8]) -> SseLine {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);
    let Some(data) = text.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<OpenAIStreamChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return SseLine::Failed(error.message);
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(SseLine::Token)
                .unwrap_or(SseLine::Skip)
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable completion chunk");
            SseLine::Skip
        }
    }
}

pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiCompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AssistantResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::transport(SERVICE, e))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: None,
        })
    }

    pub fn from_settings(settings: &CompletionSettings) -> AssistantResult<Self> {
        let api_key = settings.api_key()?;
        let mut client = Self::new(settings.base_url.clone(), api_key, settings.model.clone())?;
        client.max_tokens = settings.max_tokens;
        Ok(client)
    }

    fn create_request(&self, messages: &[ChatMessage]) -> OpenAIRequest {
        let messages = messages
            .iter()
            .map(|message| OpenAIMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            })
            .collect();

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionClient {
    async fn stream_completion(&self, messages: &[ChatMessage]) -> AssistantResult<TokenStream> {
        let request = self.create_request(messages);
        log_external_call!(SERVICE, "/chat/completions");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::from_status(status.as_u16(), body));
        }

        let mut body = response.bytes_stream();
        let tokens = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            // Set once the stream reached [DONE] or already yielded an error.
            let mut ended = false;

            'read: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        ended = true;
                        yield Err(AssistantError::transport(SERVICE, e));
                        break 'read;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    match parse_sse_line(&line) {
                        SseLine::Token(token) => {
                            yield Ok(token);
                        }
                        SseLine::Done => {
                            ended = true;
                            break 'read;
                        }
                        SseLine::Failed(message) => {
                            ended = true;
                            yield Err(AssistantError::Upstream(message));
                            break 'read;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            // A last line without its newline still counts.
            if !ended && !buffer.is_empty() {
                match parse_sse_line(&buffer) {
                    SseLine::Token(token) => {
                        yield Ok(token);
                    }
                    SseLine::Done => {
                        ended = true;
                    }
                    SseLine::Failed(message) => {
                        ended = true;
                        yield Err(AssistantError::Upstream(message));
                    }
                    SseLine::Skip => {}
                }
            }

            if !ended {
                yield Err(AssistantError::Upstream(
                    "completion stream ended before [DONE]".to_string(),
                ));
            }
        };

        Ok(Box::pin(tokens))
    }
}

/// Lifecycle of one streamed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Open,
    Streaming,
    Finished,
    Errored,
}

/// Logs how a frame stream ended. Dropping it while still streaming means
/// the consumer went away.
struct StreamOutcome {
    state: ProducerState,
    deltas: usize,
}

impl Drop for StreamOutcome {
    fn drop(&mut self) {
        match self.state {
            ProducerState::Finished => {
                tracing::debug!(deltas = self.deltas, "completion stream finished");
            }
            ProducerState::Errored => {
                tracing::warn!(deltas = self.deltas, "completion stream aborted by upstream error");
            }
            ProducerState::Open | ProducerState::Streaming => {
                tracing::info!(
                    deltas = self.deltas,
                    "consumer disconnected, releasing upstream completion"
                );
            }
        }
    }
}

/// Re-frames an upstream token stream as `text-delta` frames followed by a
/// single `finish` frame carrying the grounding products.
pub struct CompletionStreamProducer {
    tokens: TokenStream,
    products: Vec<ProductCard>,
}

impl CompletionStreamProducer {
    pub async fn open(
        provider: &dyn CompletionProvider,
        messages: &[ChatMessage],
        products: Vec<ProductCard>,
    ) -> AssistantResult<Self> {
        if messages.is_empty() {
            return Err(AssistantError::InvalidRequest(
                "messages must contain at least one message".to_string(),
            ));
        }
        let tokens = provider.stream_completion(messages).await?;
        Ok(Self::from_tokens(tokens, products))
    }

    pub fn from_tokens(tokens: TokenStream, products: Vec<ProductCard>) -> Self {
        Self { tokens, products }
    }

    /// Frames ready for the response body. An upstream failure is yielded as
    /// an error item, which aborts the connection without a clean frame.
    pub fn into_frames(self) -> impl Stream<Item = AssistantResult<Bytes>> + Send + 'static {
        let Self { mut tokens, products } = self;

        async_stream::stream! {
            let mut outcome = StreamOutcome { state: ProducerState::Open, deltas: 0 };

            'stream: loop {
                let next = tokens.next().await;
                outcome.state = ProducerState::Streaming;
                match next {
                    Some(Ok(token)) => {
                        if token.is_empty() {
                            continue 'stream;
                        }
                        match encode_frame(&StreamEvent::text_delta(token)) {
                            Ok(frame) => {
                                outcome.deltas += 1;
                                yield Ok(Bytes::from(frame));
                            }
                            Err(e) => {
                                outcome.state = ProducerState::Errored;
                                yield Err(AssistantError::from(e));
                                break 'stream;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "upstream completion failed mid-stream");
                        outcome.state = ProducerState::Errored;
                        yield Err(e);
                        break 'stream;
                    }
                    None => {
                        match encode_frame(&StreamEvent::finish(products)) {
                            Ok(frame) => {
                                outcome.state = ProducerState::Finished;
                                yield Ok(Bytes::from(frame));
                            }
                            Err(e) => {
                                outcome.state = ProducerState::Errored;
                                yield Err(AssistantError::from(e));
                            }
                        }
                        break 'stream;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use storefront_models::decode_frame;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens(items: Vec<AssistantResult<String>>) -> TokenStream {
        Box::pin(stream::iter(items))
    }

    fn card() -> ProductCard {
        ProductCard {
            id: "product_1".to_string(),
            title: "Snowboard".to_string(),
            handle: "snowboard".to_string(),
            price: Some("100".to_string()),
            currency: Some("USD".to_string()),
            image_url: None,
            score: 0.9,
        }
    }

    async fn collect_frames(producer: CompletionStreamProducer) -> Vec<AssistantResult<String>> {
        producer
            .into_frames()
            .map(|item| item.map(|bytes| String::from_utf8(bytes.to_vec()).unwrap()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_tokens_then_single_finish() {
        let producer = CompletionStreamProducer::from_tokens(
            tokens(vec![Ok("Hel".to_string()), Ok("lo".to_string())]),
            vec![card()],
        );

        let frames: Vec<String> = collect_frames(producer)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.starts_with("0:") && f.ends_with('\n')));
        assert_eq!(
            decode_frame(frames[0].trim_end()).unwrap(),
            StreamEvent::text_delta("Hel")
        );
        match decode_frame(frames[2].trim_end()).unwrap() {
            StreamEvent::Finish { products } => assert_eq!(products.unwrap()[0].title, "Snowboard"),
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_yields_no_finish() {
        let producer = CompletionStreamProducer::from_tokens(
            tokens(vec![
                Ok("partial".to_string()),
                Err(AssistantError::Upstream("connection reset".to_string())),
                Ok("never".to_string()),
            ]),
            vec![card()],
        );

        let frames = collect_frames(producer).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(frames[1].is_err());
    }

    #[tokio::test]
    async fn test_dropping_frames_releases_upstream() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let upstream = stream::iter(vec![Ok("first".to_string())])
            .chain(stream::pending())
            .map(move |token: AssistantResult<String>| {
                let _held = &flag;
                token
            });

        let producer = CompletionStreamProducer::from_tokens(Box::pin(upstream), vec![]);
        let mut frames = Box::pin(producer.into_frames());
        assert!(frames.next().await.unwrap().is_ok());
        assert!(!dropped.load(Ordering::SeqCst));

        drop(frames);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_before_upstream() {
        struct Unreachable;
        #[async_trait]
        impl CompletionProvider for Unreachable {
            async fn stream_completion(&self, _: &[ChatMessage]) -> AssistantResult<TokenStream> {
                panic!("must not be called");
            }
        }

        let result = CompletionStreamProducer::open(&Unreachable, &[], vec![]).await;
        assert!(matches!(result, Err(AssistantError::InvalidRequest(_))));
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(br#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            SseLine::Token("Hi".to_string())
        );
        assert_eq!(parse_sse_line(b"data: [DONE]\n"), SseLine::Done);
        assert_eq!(parse_sse_line(b": keep-alive\n"), SseLine::Skip);
        assert_eq!(
            parse_sse_line(br#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(br#"data: {"error":{"message":"overloaded"}}"#),
            SseLine::Failed("overloaded".to_string())
        );
    }

    #[tokio::test]
    async fn test_openai_stream_against_mock() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompletionClient::new(server.uri(), "sk-test", "gpt-4o-mini").unwrap();
        let stream = client
            .stream_completion(&[ChatMessage::user("hello")])
            .await
            .unwrap();
        let tokens: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(tokens, vec!["Hel", "lo"]);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["messages"][0]["role"], "user");
    }

    async fn mock_completion_body(body: &'static str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_truncated_upstream_ends_without_finish() {
        let server =
            mock_completion_body("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n").await;
        let client = OpenAiCompletionClient::new(server.uri(), "sk-test", "gpt-4o-mini").unwrap();

        let producer = CompletionStreamProducer::open(&client, &[ChatMessage::user("hi")], vec![card()])
            .await
            .unwrap();
        let frames = collect_frames(producer).await;

        assert_eq!(frames.len(), 2);
        assert_eq!(
            decode_frame(frames[0].as_ref().unwrap().trim_end()).unwrap(),
            StreamEvent::text_delta("Hel")
        );
        assert!(matches!(frames[1], Err(AssistantError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_final_line_without_newline_is_parsed() {
        let server = mock_completion_body(concat!(
            "data:{\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]",
        ))
        .await;
        let client = OpenAiCompletionClient::new(server.uri(), "sk-test", "gpt-4o-mini").unwrap();

        let items: Vec<AssistantResult<String>> = client
            .stream_completion(&[ChatMessage::user("hi")])
            .await
            .unwrap()
            .collect()
            .await;
        let tokens: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_unterminated_last_token_is_kept_then_truncation_reported() {
        let server = mock_completion_body(concat!(
            "data:{\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}",
        ))
        .await;
        let client = OpenAiCompletionClient::new(server.uri(), "sk-test", "gpt-4o-mini").unwrap();

        let items: Vec<AssistantResult<String>> = client
            .stream_completion(&[ChatMessage::user("hi")])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "Hel");
        assert_eq!(items[1].as_deref().unwrap(), "lo");
        assert!(matches!(items[2], Err(AssistantError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_openai_rejection_is_returned_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = OpenAiCompletionClient::new(server.uri(), "bad", "gpt-4o-mini").unwrap();
        let err = client
            .stream_completion(&[ChatMessage::user("hello")])
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), Some(401));
    }
}
