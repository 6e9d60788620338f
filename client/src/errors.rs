use storefront_models::FrameError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Malformed frame: {0}")]
    Protocol(#[from] FrameError),

    #[error("Stream closed before the answer finished")]
    UpstreamDisconnect,

    #[error("Assistant API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Assistant reported an error: {0}")]
    Stream(String),

    #[error("Message is empty")]
    EmptyMessage,
}

pub type ClientResult<T> = Result<T, ClientError>;
