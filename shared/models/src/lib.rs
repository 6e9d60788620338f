//! Types shared by the assistant service and its chat client: catalog
//! entities, index records, search results, stream frames and chat messages.

pub mod catalog;
pub mod chat;
pub mod index;
pub mod stream;

pub use catalog::{CatalogExport, CollectionRecord, ImageRef, Money, PriceRange, ProductRecord, ToIndexRecord};
pub use chat::{ChatMessage, ConversationMessage, Role};
pub use index::{
    sanitize_id, FormattedResult, IndexRecord, IndexStats, MetadataFilter, MetadataValue,
    NamespaceSummary, RecordType, SearchHit, SearchResults,
};
pub use stream::{decode_frame, encode_frame, FrameError, ProductCard, StreamEvent, FRAME_CHANNEL};
