//! Correlation ids shared by the chat client and the assistant service.
//!
//! The client mints one context per chat turn and sends it with `POST /chat`;
//! the request middleware adopts it so client and server logs of a turn
//! carry the same `trace_id`. A W3C `traceparent` header wins over
//! `x-trace-id` when both are present.

use actix_web::{HttpMessage, HttpRequest};
use std::fmt;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    /// Span of the caller, when the request carried one.
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: span_id(),
            parent_span_id: None,
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        let header = |name: &str| req.headers().get(name).and_then(|h| h.to_str().ok());

        if let Some(ctx) = header(TRACEPARENT_HEADER).and_then(Self::parse_traceparent) {
            return ctx;
        }
        match header(TRACE_ID_HEADER).filter(|id| !id.is_empty()) {
            Some(trace_id) => Self {
                trace_id: trace_id.to_string(),
                span_id: span_id(),
                parent_span_id: None,
            },
            None => Self::new(),
        }
    }

    /// `00-<trace>-<parent>-<flags>`; anything shorter is ignored.
    fn parse_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.split('-');
        let _version = parts.next()?;
        let trace_id = parts.next().filter(|p| !p.is_empty())?;
        let parent = parts.next().filter(|p| !p.is_empty())?;
        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id(),
            parent_span_id: Some(parent.to_string()),
        })
    }

    /// Headers for an outbound request made on behalf of this context.
    pub fn outgoing_headers(&self) -> [(&'static str, String); 2] {
        [
            (TRACE_ID_HEADER, self.trace_id.clone()),
            (TRACEPARENT_HEADER, format!("00-{}-{}-01", self.trace_id, self.span_id)),
        ]
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace_id={} span_id={}", self.trace_id, self.span_id)
    }
}

fn span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Context stored by the middleware, or a fresh one outside of it.
pub trait TraceContextExt {
    fn trace_context(&self) -> TraceContext;
}

impl TraceContextExt for HttpRequest {
    fn trace_context(&self) -> TraceContext {
        self.extensions()
            .get::<TraceContext>()
            .cloned()
            .unwrap_or_else(|| TraceContext::from_request(self))
    }
}
