use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use storefront_models::{CatalogExport, IndexRecord, RecordType, ToIndexRecord};

use crate::errors::AssistantResult;
use crate::services::vector_index::VectorIndexClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub products: usize,
    pub collections: usize,
    pub pruned: usize,
}

impl IngestionSummary {
    pub fn total(&self) -> usize {
        self.products + self.collections
    }
}

/// Turns a catalog export into index records and writes them to the index.
pub struct IngestionPipeline {
    index: Arc<VectorIndexClient>,
    namespace: String,
}

impl IngestionPipeline {
    pub fn new(index: Arc<VectorIndexClient>, namespace: impl Into<String>) -> Self {
        Self {
            index,
            namespace: namespace.into(),
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.namespace
    }

    /// Products first, then collections. A source entity listed twice yields
    /// one record (the last occurrence wins).
    pub fn build_records(export: &CatalogExport) -> Vec<IndexRecord> {
        let all = export
            .products
            .iter()
            .map(ToIndexRecord::to_index_record)
            .chain(export.collections.iter().map(ToIndexRecord::to_index_record));

        let mut records: Vec<IndexRecord> = Vec::new();
        let mut positions = std::collections::HashMap::new();
        for record in all {
            match positions.get(&record.id) {
                Some(&position) => records[position] = record,
                None => {
                    positions.insert(record.id.clone(), records.len());
                    records.push(record);
                }
            }
        }
        records
    }

    /// Upserts every record of `export` into `namespace` and waits until the
    /// index reports them. An empty export touches nothing.
    pub async fn ingest(
        &self,
        namespace: Option<&str>,
        export: &CatalogExport,
    ) -> AssistantResult<IngestionSummary> {
        let namespace = namespace.unwrap_or(&self.namespace);
        let records = Self::build_records(export);
        if records.is_empty() {
            tracing::info!(namespace = %namespace, "nothing to ingest");
            return Ok(IngestionSummary::default());
        }

        let summary = IngestionSummary {
            products: count_of(&records, RecordType::Product),
            collections: count_of(&records, RecordType::Collection),
            pruned: 0,
        };

        tracing::info!(
            namespace = %namespace,
            products = summary.products,
            collections = summary.collections,
            "starting ingestion"
        );

        let tuning = self.index.tuning();
        self.index
            .upsert_records(namespace, &records, tuning.batch_size)
            .await?;
        self.index
            .wait_for_records(namespace, records.len() as u64, tuning.max_wait)
            .await?;

        Ok(summary)
    }

    /// Like [`ingest`](Self::ingest), then deletes catalog records in the
    /// namespace that this run did not produce.
    pub async fn ingest_and_prune(
        &self,
        namespace: Option<&str>,
        export: &CatalogExport,
    ) -> AssistantResult<IngestionSummary> {
        let mut summary = self.ingest(namespace, export).await?;
        if summary.total() == 0 {
            return Ok(summary);
        }
        let keep: HashSet<String> = Self::build_records(export)
            .into_iter()
            .map(|record| record.id)
            .collect();
        summary.pruned = self
            .prune_stale(namespace.unwrap_or(&self.namespace), &keep)
            .await?;
        Ok(summary)
    }

    pub async fn prune_stale(&self, namespace: &str, keep: &HashSet<String>) -> AssistantResult<usize> {
        let mut stale = Vec::new();
        for record_type in [RecordType::Product, RecordType::Collection] {
            let prefix = record_type.id_prefix();
            let ids = self.index.list_all_ids(namespace, Some(&prefix)).await?;
            stale.extend(ids.into_iter().filter(|id| !keep.contains(id)));
        }

        if stale.is_empty() {
            return Ok(0);
        }
        tracing::info!(namespace = %namespace, stale = stale.len(), "pruning stale records");
        self.index.delete_records(namespace, &stale).await
    }
}

fn count_of(records: &[IndexRecord], record_type: RecordType) -> usize {
    records
        .iter()
        .filter(|record| record.record_type == record_type)
        .count()
}
