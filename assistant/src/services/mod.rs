pub mod catalog_source;
pub mod chat;
pub mod completion;
pub mod grounding;
pub mod ingestion;
pub mod query;
pub mod retry;
pub mod vector_index;

pub use catalog_source::{CatalogSource, JsonFileCatalogSource, StorefrontCatalogSource};
pub use chat::ChatService;
pub use completion::{
    CompletionProvider, CompletionStreamProducer, OpenAiCompletionClient, ProducerState, TokenStream,
};
pub use grounding::ProductGrounding;
pub use ingestion::{IngestionPipeline, IngestionSummary};
pub use query::{format_search_results, type_filter, QueryPipeline};
pub use retry::RetryPolicy;
pub use vector_index::{IndexTuning, VectorIndexClient};
