use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use storefront_models::ChatMessage;
use storefront_observability::{log_external_call, TraceContext};

use crate::errors::{ClientError, ClientResult};

pub type ByteStream = Pin<Box<dyn Stream<Item = ClientResult<Bytes>> + Send>>;

/// Opens one streamed chat response.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, messages: &[ChatMessage]) -> ClientResult<ByteStream>;
}

/// Talks to the assistant's `POST /chat` over HTTP.
#[derive(Clone)]
pub struct HttpChatTransport {
    client: Client,
    base_url: String,
}

impl HttpChatTransport {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        // No overall timeout: a long answer is a long body.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open(&self, messages: &[ChatMessage]) -> ClientResult<ByteStream> {
        let url = format!("{}/chat", self.base_url);
        let trace = TraceContext::new();
        log_external_call!("assistant", url.as_str());
        tracing::debug!(trace_id = %trace.trace_id, messages = messages.len(), "opening chat turn");

        let mut request = self.client.post(&url).json(&json!({ "messages": messages }));
        for (name, value) in trace.outgoing_headers() {
            request = request.header(name, value);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from));
        Ok(Box::pin(body))
    }
}
