//! Conversation state for one chat session.
//!
//! The orchestrator owns the message list. Each turn appends the user
//! message and an empty assistant placeholder, then applies stream events to
//! the placeholder until `finish` arrives or the stream fails.

use std::collections::HashSet;

use futures::StreamExt;
use storefront_models::{ChatMessage, ConversationMessage, ProductCard, Role, StreamEvent};

use crate::errors::ClientError;
use crate::parser::parse_stream;
use crate::transport::ChatTransport;

/// The one message a user sees when a turn fails.
pub const FAILURE_NOTICE: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug)]
pub enum TurnOutcome {
    Finished,
    Failed(ClientError),
}

impl TurnOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, TurnOutcome::Finished)
    }
}

pub struct ChatOrchestrator<T: ChatTransport> {
    transport: T,
    messages: Vec<ConversationMessage>,
    /// Failure notices and answers cut off before `finish`. Shown, never
    /// sent upstream.
    off_record: HashSet<String>,
}

impl<T: ChatTransport> ChatOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            messages: Vec::new(),
            off_record: HashSet::new(),
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Products attached to the latest assistant message, if any.
    pub fn latest_products(&self) -> Option<&[ProductCard]> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.products.as_deref())
    }

    /// What gets sent upstream: everything except failure notices, partial
    /// answers of failed turns and assistant messages without content.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !self.off_record.contains(&m.id))
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .map(ConversationMessage::to_chat_message)
            .collect()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.off_record.clear();
    }

    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome, ClientError> {
        self.send_with(text, |_| {}).await
    }

    /// Runs one turn. `render` sees the message list after every change.
    ///
    /// Only an empty message is an `Err`; every other failure is reported as
    /// `TurnOutcome::Failed` after the notice has been added.
    pub async fn send_with<F>(&mut self, text: &str, mut render: F) -> Result<TurnOutcome, ClientError>
    where
        F: FnMut(&[ConversationMessage]),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        self.messages.push(ConversationMessage::user(text));
        let history = self.history();
        let placeholder = ConversationMessage::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder);
        render(&self.messages);

        let body = match self.transport.open(&history).await {
            Ok(body) => body,
            Err(e) => {
                self.fail(&placeholder_id, &mut render);
                return Ok(TurnOutcome::Failed(e));
            }
        };

        let mut events = Box::pin(parse_stream(body));
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    self.fail(&placeholder_id, &mut render);
                    return Ok(TurnOutcome::Failed(e));
                }
            };

            match event {
                StreamEvent::TextDelta { text_delta } => {
                    if let Some(message) = self.find_mut(&placeholder_id) {
                        message.content.push_str(&text_delta);
                    }
                }
                StreamEvent::Finish { products } => {
                    if let Some(message) = self.find_mut(&placeholder_id) {
                        message.products = products;
                    }
                    render(&self.messages);
                    return Ok(TurnOutcome::Finished);
                }
                StreamEvent::Error { error } => {
                    tracing::warn!(error = %error, "assistant stream reported an error");
                    self.fail(&placeholder_id, &mut render);
                    return Ok(TurnOutcome::Failed(ClientError::Stream(error)));
                }
                StreamEvent::ToolCallStart { tool_name } => {
                    tracing::debug!(tool = ?tool_name, "ignoring tool call start");
                    continue;
                }
                StreamEvent::ToolCallComplete { tool_calls } => {
                    tracing::debug!(count = tool_calls.len(), "ignoring completed tool calls");
                    continue;
                }
            }
            render(&self.messages);
        }

        tracing::warn!("assistant stream closed without finish");
        self.fail(&placeholder_id, &mut render);
        Ok(TurnOutcome::Failed(ClientError::UpstreamDisconnect))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Drops the placeholder if nothing arrived and appends a single notice.
    /// Partial content already streamed stays visible but off the record.
    fn fail<F>(&mut self, placeholder_id: &str, render: &mut F)
    where
        F: FnMut(&[ConversationMessage]),
    {
        self.messages
            .retain(|m| !(m.id == placeholder_id && m.content.is_empty()));
        if self.messages.iter().any(|m| m.id == placeholder_id) {
            self.off_record.insert(placeholder_id.to_string());
        }

        let notice = ConversationMessage::new(Role::Assistant, FAILURE_NOTICE);
        self.off_record.insert(notice.id.clone());
        self.messages.push(notice);
        render(&self.messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientResult;
    use crate::transport::ByteStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::sync::Mutex;

    /// Replays canned chunks and records what each turn sent.
    struct ScriptedTransport {
        turns: Mutex<Vec<Vec<ClientResult<Bytes>>>>,
        sent: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Vec<ClientResult<Bytes>>>) -> Self {
            Self {
                turns: Mutex::new(turns),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(&self, messages: &[ChatMessage]) -> ClientResult<ByteStream> {
            self.sent.lock().unwrap().push(messages.to_vec());
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Err(ClientError::Http {
                    status: 500,
                    body: "no script".to_string(),
                });
            }
            Ok(Box::pin(stream::iter(turns.remove(0))))
        }
    }

    fn chunk(s: &'static str) -> ClientResult<Bytes> {
        Ok(Bytes::from_static(s.as_bytes()))
    }

    const FINISH_WITH_PRODUCT: &str =
        "0:{\"type\":\"finish\",\"products\":[{\"id\":\"p1\",\"title\":\"Snowboard\",\"handle\":\"snowboard\",\"score\":0.9}]}\n";

    #[tokio::test]
    async fn test_deltas_concatenate_and_finish_attaches_products() {
        let transport = ScriptedTransport::new(vec![vec![
            chunk("0:{\"type\":\"text-delta\",\"textDelta\":\"Hel\"}\n0:{\"type\":\"text-del"),
            chunk("ta\",\"textDelta\":\"lo\"}\n"),
            chunk(FINISH_WITH_PRODUCT),
        ]]);
        let mut chat = ChatOrchestrator::new(transport);

        let mut renders = 0;
        let outcome = chat.send_with("hi there", |_| renders += 1).await.unwrap();
        assert!(outcome.is_finished());
        assert!(renders >= 3);

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Hello");
        let products = chat.latest_products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "Snowboard");
    }

    #[tokio::test]
    async fn test_error_event_replaces_empty_placeholder_with_notice() {
        let transport = ScriptedTransport::new(vec![vec![chunk(
            "0:{\"type\":\"error\",\"error\":\"upstream exploded\"}\n",
        )]]);
        let mut chat = ChatOrchestrator::new(transport);

        let outcome = chat.send("hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(ClientError::Stream(_))));

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, FAILURE_NOTICE);
        assert!(!messages[1].content.contains("exploded"));
    }

    #[tokio::test]
    async fn test_close_without_finish_keeps_partial_answer() {
        let transport = ScriptedTransport::new(vec![vec![chunk(
            "0:{\"type\":\"text-delta\",\"textDelta\":\"Partial\"}\n",
        )]]);
        let mut chat = ChatOrchestrator::new(transport);

        let outcome = chat.send("hi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(ClientError::UpstreamDisconnect)));

        let contents: Vec<&str> = chat.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Partial", FAILURE_NOTICE]);
    }

    #[tokio::test]
    async fn test_partial_answer_of_failed_turn_is_not_sent_again() {
        let transport = ScriptedTransport::new(vec![
            vec![chunk("0:{\"type\":\"text-delta\",\"textDelta\":\"Partial\"}\n")],
            vec![chunk("0:{\"type\":\"finish\"}\n")],
        ]);
        let mut chat = ChatOrchestrator::new(transport);

        chat.send("first").await.unwrap();
        assert_eq!(chat.messages()[1].content, "Partial");
        assert_eq!(chat.history(), vec![ChatMessage::user("first")]);

        chat.send("second").await.unwrap();
        let sent = chat.transport.sent.lock().unwrap().clone();
        assert_eq!(
            sent[1],
            vec![ChatMessage::user("first"), ChatMessage::user("second")]
        );
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_fails_turn() {
        let transport = ScriptedTransport::new(vec![vec![
            chunk("0:{\"type\":\"text-delta\",\"textDelta\":\"Par\"}\n"),
            Err(ClientError::UpstreamDisconnect),
        ]]);
        let mut chat = ChatOrchestrator::new(transport);

        let outcome = chat.send("hi").await.unwrap();
        assert!(!outcome.is_finished());
        assert_eq!(chat.messages().last().unwrap().content, FAILURE_NOTICE);
    }

    #[tokio::test]
    async fn test_open_failure_and_notice_stays_out_of_history() {
        let transport = ScriptedTransport::new(vec![]);
        let mut chat = ChatOrchestrator::new(transport);

        let outcome = chat.send("first").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Failed(ClientError::Http { status: 500, .. })));
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.history(), vec![ChatMessage::user("first")]);
    }

    #[tokio::test]
    async fn test_tool_call_events_are_ignored() {
        let transport = ScriptedTransport::new(vec![vec![
            chunk("0:{\"type\":\"tool-call-start\",\"toolName\":\"search\"}\n"),
            chunk("0:{\"type\":\"tool-call-complete\",\"toolCalls\":[]}\n"),
            chunk("0:{\"type\":\"text-delta\",\"textDelta\":\"ok\"}\n0:{\"type\":\"finish\"}\n"),
        ]]);
        let mut chat = ChatOrchestrator::new(transport);

        assert!(chat.send("hi").await.unwrap().is_finished());
        assert_eq!(chat.messages()[1].content, "ok");
        assert!(chat.latest_products().is_none());
    }

    #[tokio::test]
    async fn test_second_turn_sends_previous_answer() {
        let transport = ScriptedTransport::new(vec![
            vec![chunk("0:{\"type\":\"text-delta\",\"textDelta\":\"Hi!\"}\n0:{\"type\":\"finish\"}\n")],
            vec![chunk("0:{\"type\":\"finish\"}\n")],
        ]);
        let mut chat = ChatOrchestrator::new(transport);

        chat.send("hello").await.unwrap();
        chat.send("  again ").await.unwrap();

        let sent = chat.transport.sent.lock().unwrap().clone();
        assert_eq!(sent[0], vec![ChatMessage::user("hello")]);
        assert_eq!(
            sent[1],
            vec![
                ChatMessage::user("hello"),
                ChatMessage::new(Role::Assistant, "Hi!"),
                ChatMessage::user("again"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let mut chat = ChatOrchestrator::new(ScriptedTransport::new(vec![]));
        assert!(matches!(chat.send("   ").await, Err(ClientError::EmptyMessage)));
        assert!(chat.messages().is_empty());
        assert!(chat.transport.sent.lock().unwrap().is_empty());
    }
}
