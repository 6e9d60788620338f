use serde_json::{json, Map, Value};
use std::sync::Arc;
use storefront_models::{FormattedResult, MetadataFilter, RecordType, SearchResults};

use crate::errors::AssistantResult;
use crate::services::vector_index::VectorIndexClient;

/// Type-partitioned semantic search over the shared catalog namespace.
pub struct QueryPipeline {
    index: Arc<VectorIndexClient>,
    namespace: String,
}

/// Shallow union of `extra` with a forced `type` equality. Caller keys are
/// kept, except `type`, which is always replaced.
pub fn type_filter(record_type: RecordType, extra: Option<&MetadataFilter>) -> MetadataFilter {
    let mut filter = extra.cloned().unwrap_or_default();
    if let Some(previous) = filter.get("type") {
        tracing::warn!(
            caller_filter = %previous,
            forced = record_type.as_str(),
            "overriding caller supplied type filter"
        );
    }
    filter.insert("type".to_string(), json!({ "$eq": record_type.as_str() }));
    filter
}

/// Flattens hits into presentation results. Missing content becomes `""`;
/// every other field lands in `metadata`.
pub fn format_search_results(results: &SearchResults) -> Vec<FormattedResult> {
    results
        .hits
        .iter()
        .map(|hit| {
            let mut metadata: Map<String, Value> = hit.fields.clone();
            let content = match metadata.remove("content") {
                Some(Value::String(text)) => text,
                _ => String::new(),
            };
            FormattedResult {
                id: hit.id.clone(),
                score: hit.score,
                content,
                metadata,
            }
        })
        .collect()
}

impl QueryPipeline {
    pub fn new(index: Arc<VectorIndexClient>, namespace: impl Into<String>) -> Self {
        Self {
            index,
            namespace: namespace.into(),
        }
    }

    pub async fn search_products(
        &self,
        query: &str,
        top_k: usize,
        extra_filter: Option<&MetadataFilter>,
    ) -> AssistantResult<SearchResults> {
        self.search_type(RecordType::Product, query, top_k, extra_filter).await
    }

    pub async fn search_collections(
        &self,
        query: &str,
        top_k: usize,
        extra_filter: Option<&MetadataFilter>,
    ) -> AssistantResult<SearchResults> {
        self.search_type(RecordType::Collection, query, top_k, extra_filter).await
    }

    async fn search_type(
        &self,
        record_type: RecordType,
        query: &str,
        top_k: usize,
        extra_filter: Option<&MetadataFilter>,
    ) -> AssistantResult<SearchResults> {
        let filter = type_filter(record_type, extra_filter);
        self.index
            .search_with_rerank(&self.namespace, query, top_k, Some(&filter))
            .await
    }
}
