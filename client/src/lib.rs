//! Chat client for the storefront assistant.
//!
//! [`HttpChatTransport`] opens `POST /chat`, [`StreamFrameParser`] turns the
//! response body back into [`StreamEvent`](storefront_models::StreamEvent)s
//! and [`ChatOrchestrator`] keeps the conversation they update.

pub mod errors;
pub mod orchestrator;
pub mod parser;
pub mod transport;

pub use errors::{ClientError, ClientResult};
pub use orchestrator::{ChatOrchestrator, TurnOutcome, FAILURE_NOTICE};
pub use parser::{parse_line, parse_stream, StreamFrameParser};
pub use transport::{ByteStream, ChatTransport, HttpChatTransport};
