//! Wire protocol of the chat stream.
//!
//! Each frame is one line, `<channel>:<json>\n`, where the JSON is a tagged
//! [`StreamEvent`]. The channel is a fixed literal. There is no length prefix:
//! a raw newline inside a token would split a frame, which JSON string
//! escaping prevents on the producing side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::index::FormattedResult;

pub const FRAME_CHANNEL: &str = "0";

/// A product suggestion attached to the end of an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCard {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub score: f32,
}

impl ProductCard {
    /// Hits without a title cannot be rendered as a card.
    pub fn from_result(result: &FormattedResult) -> Option<Self> {
        let title = result.text_field("title")?.to_string();
        Some(Self {
            id: result.id.clone(),
            title,
            handle: result.text_field("handle").unwrap_or_default().to_string(),
            price: result.text_field("price").map(str::to_string),
            currency: result.text_field("currency").map(str::to_string),
            image_url: result.text_field("image_url").map(str::to_string),
            score: result.score,
        })
    }

    /// One-line description used when grounding a prompt.
    pub fn summary(&self) -> String {
        let mut line = format!("- {} (handle: {})", self.title, self.handle);
        if let Some(price) = &self.price {
            line.push_str(&format!(", price: {}", price));
            if let Some(currency) = &self.currency {
                line.push_str(&format!(" {}", currency));
            }
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextDelta {
        #[serde(rename = "textDelta")]
        text_delta: String,
    },
    ToolCallStart {
        #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
    ToolCallComplete {
        #[serde(rename = "toolCalls", default)]
        tool_calls: Vec<Value>,
    },
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        products: Option<Vec<ProductCard>>,
    },
    Error {
        error: String,
    },
}

impl StreamEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            text_delta: text.into(),
        }
    }

    pub fn finish(products: Vec<ProductCard>) -> Self {
        StreamEvent::Finish {
            products: if products.is_empty() { None } else { Some(products) },
        }
    }

    /// `finish` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. } | StreamEvent::Error { .. })
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no channel separator")]
    MissingSeparator,

    #[error("frame payload is not a stream event: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Serialize one event as a complete frame, trailing newline included.
pub fn encode_frame(event: &StreamEvent) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(event)?;
    Ok(format!("{}:{}\n", FRAME_CHANNEL, payload))
}

/// Parse one line (without its newline) into an event. The channel prefix is
/// everything before the first `:` and is not interpreted.
pub fn decode_frame(line: &str) -> Result<StreamEvent, FrameError> {
    let line = line.trim_end_matches('\r');
    let (_channel, payload) = line.split_once(':').ok_or(FrameError::MissingSeparator)?;
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_delta_frame_layout() {
        let frame = encode_frame(&StreamEvent::text_delta("hi")).unwrap();
        assert_eq!(frame, "0:{\"type\":\"text-delta\",\"textDelta\":\"hi\"}\n");
    }

    #[test]
    fn test_newline_in_token_stays_inside_one_frame() {
        let frame = encode_frame(&StreamEvent::text_delta("line one\nline two")).unwrap();
        assert_eq!(frame.matches('\n').count(), 1);
        assert!(frame.ends_with('\n'));

        let decoded = decode_frame(frame.trim_end_matches('\n')).unwrap();
        assert_eq!(decoded, StreamEvent::text_delta("line one\nline two"));
    }

    #[test]
    fn test_finish_without_products_omits_field() {
        let value = serde_json::to_value(StreamEvent::finish(vec![])).unwrap();
        assert_eq!(value, json!({"type": "finish"}));
    }

    #[test]
    fn test_decode_tool_call_events() {
        let start = decode_frame(r#"0:{"type":"tool-call-start"}"#).unwrap();
        assert_eq!(start, StreamEvent::ToolCallStart { tool_name: None });

        let complete = decode_frame(r#"0:{"type":"tool-call-complete","toolCalls":[{"name":"search"}]}"#).unwrap();
        match complete {
            StreamEvent::ToolCallComplete { tool_calls } => assert_eq!(tool_calls.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(matches!(decode_frame("no separator"), Err(FrameError::MissingSeparator)));
        assert!(matches!(decode_frame("0:{\"type\":"), Err(FrameError::Payload(_))));
        assert!(matches!(decode_frame("0:{\"type\":\"unknown\"}"), Err(FrameError::Payload(_))));
    }

    #[test]
    fn test_product_card_requires_title() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("handle".to_string(), json!("snowboard"));
        let mut result = FormattedResult {
            id: "product_1".to_string(),
            score: 0.9,
            content: "Snowboard".to_string(),
            metadata,
        };
        assert!(ProductCard::from_result(&result).is_none());

        result.metadata.insert("title".to_string(), json!("Snowboard"));
        result.metadata.insert("price".to_string(), json!("100"));
        result.metadata.insert("currency".to_string(), json!("USD"));
        let card = ProductCard::from_result(&result).unwrap();
        assert_eq!(card.summary(), "- Snowboard (handle: snowboard), price: 100 USD");
    }
}
