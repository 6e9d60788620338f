use actix_web::{web, HttpResponse};
use serde_json::Value;
use storefront_models::ChatMessage;

use crate::errors::{AssistantError, AssistantResult};
use crate::state::AppState;

/// Pulls `messages` out of the raw request body. An empty or non-JSON body,
/// or anything but a list of `{role, content}` objects, is a bad request.
fn parse_messages(body: &[u8]) -> AssistantResult<Vec<ChatMessage>> {
    let body: Value = serde_json::from_slice(body)
        .map_err(|e| AssistantError::InvalidRequest(format!("body is not JSON: {}", e)))?;
    let messages = match body {
        Value::Object(mut fields) => fields.remove("messages"),
        _ => None,
    };
    match messages {
        Some(list @ Value::Array(_)) => serde_json::from_value(list)
            .map_err(|e| AssistantError::InvalidRequest(format!("invalid message: {}", e))),
        Some(_) => Err(AssistantError::InvalidRequest("messages must be a list".to_string())),
        None => Err(AssistantError::InvalidRequest("messages is required".to_string())),
    }
}

/// POST /chat
///
/// Answers with one `0:<json>` frame per line. Errors found before the first
/// frame are plain JSON responses.
pub async fn chat(state: web::Data<AppState>, body: web::Bytes) -> AssistantResult<HttpResponse> {
    state.chat.provider()?;
    let messages = parse_messages(&body)?;

    let producer = state.chat.open_stream(messages).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(producer.into_frames()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_json(body: Value) -> AssistantResult<Vec<ChatMessage>> {
        parse_messages(body.to_string().as_bytes())
    }

    #[test]
    fn test_parse_messages() {
        let messages = parse_json(json!({"messages": [{"role": "user", "content": "hi"}]})).unwrap();
        assert_eq!(messages, vec![ChatMessage::user("hi")]);

        assert!(matches!(
            parse_json(json!({"messages": "hi"})),
            Err(AssistantError::InvalidRequest(_))
        ));
        assert!(matches!(parse_json(json!({})), Err(AssistantError::InvalidRequest(_))));
        assert!(matches!(
            parse_json(json!({"messages": [{"role": "robot", "content": "x"}]})),
            Err(AssistantError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_empty_or_non_json_body_is_invalid_request() {
        assert!(matches!(parse_messages(b""), Err(AssistantError::InvalidRequest(_))));
        assert!(matches!(parse_messages(b"messages=hi"), Err(AssistantError::InvalidRequest(_))));
    }
}
