//! Storefront assistant service: catalog ingestion into the vector index,
//! type-filtered retrieval, and streamed chat completions grounded on the
//! catalog.

pub mod errors;
pub mod handlers;
pub mod services;
pub mod state;

pub use errors::{AssistantError, AssistantResult};
pub use state::AppState;
