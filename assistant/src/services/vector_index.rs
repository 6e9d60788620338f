use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use storefront_config::IndexSettings;
use storefront_models::{IndexRecord, IndexStats, MetadataFilter, SearchHit, SearchResults};
use storefront_observability::log_external_call;
use tokio::time::Instant;

use crate::errors::{AssistantError, AssistantResult};
use crate::services::retry::RetryPolicy;

const SERVICE: &str = "vector-index";
const DELETE_CHUNK: usize = 1000;

/// Knobs of the index client. The defaults match the hosted service limits.
#[derive(Debug, Clone)]
pub struct IndexTuning {
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub list_page_size: usize,
    pub rerank_model: String,
}

impl Default for IndexTuning {
    fn default() -> Self {
        Self {
            batch_size: 96,
            batch_pause: Duration::from_millis(100),
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
            list_page_size: 1000,
            rerank_model: "bge-reranker-v2-m3".to_string(),
        }
    }
}

/// REST client for the hosted vector index (integrated-embedding records API)
pub struct VectorIndexClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    retry: RetryPolicy,
    tuning: IndexTuning,
}

// ============================================================================
// Index API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: SearchQuery<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rerank: Option<RerankSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    inputs: SearchInputs<'a>,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a MetadataFilter>,
}

#[derive(Debug, Serialize)]
struct SearchInputs<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct RerankSpec<'a> {
    model: &'a str,
    top_n: usize,
    rank_fields: [&'static str; 1],
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResults,
}

#[derive(Debug, Deserialize, Default)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedRecord>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

impl VectorIndexClient {
    /// Create a client for the index data plane at `base_url`
    /// (e.g. `https://storefront-abc123.svc.example.io`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> AssistantResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssistantError::transport(SERVICE, e))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::info!(base_url = %base_url, "vector index client initialized");

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            api_version: api_version.into(),
            retry: RetryPolicy::default(),
            tuning: IndexTuning::default(),
        })
    }

    pub fn from_settings(settings: &IndexSettings) -> AssistantResult<Self> {
        let api_key = settings.api_key()?;
        let host = settings.host_url()?;
        Self::new(host, api_key, settings.api_version.clone())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_tuning(mut self, tuning: IndexTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn tuning(&self) -> &IndexTuning {
        &self.tuning
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn namespace_url(&self, namespace: &str, action: &str) -> String {
        self.url(&format!(
            "/records/namespaces/{}/{}",
            urlencoding::encode(namespace),
            action
        ))
    }

    /// Sends an authenticated request. Any non-2xx status becomes an error
    /// carrying the status and the body text.
    async fn execute(&self, endpoint: &str, request: RequestBuilder) -> AssistantResult<Response> {
        log_external_call!(SERVICE, endpoint);
        let started = Instant::now();

        let response = request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AssistantError::transport(SERVICE, e))?;

        let status = response.status();
        log_external_call!(
            SERVICE,
            endpoint,
            started.elapsed().as_millis() as u64,
            status.as_u16()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn execute_json<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> AssistantResult<R> {
        let response = self.execute(endpoint, request).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| AssistantError::transport(SERVICE, e))
    }

    /// Whether the index answers at all. Never fails.
    pub async fn index_exists(&self) -> bool {
        match self.get_index_stats().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "index stats probe failed");
                false
            }
        }
    }

    pub async fn get_index_stats(&self) -> AssistantResult<IndexStats> {
        let request = self.client.post(self.url("/describe_index_stats")).json(&json!({}));
        self.execute_json("/describe_index_stats", request).await
    }

    /// Upserts `records` in sequential batches of at most `batch_size`. Each
    /// batch goes through the retry policy and is followed by the configured
    /// pause. The first batch that still fails aborts the run.
    pub async fn upsert_records(
        &self,
        namespace: &str,
        records: &[IndexRecord],
        batch_size: usize,
    ) -> AssistantResult<usize> {
        let batch_size = batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        let url = self.namespace_url(namespace, "upsert");
        let mut upserted = 0;

        for (index, batch) in records.chunks(batch_size).enumerate() {
            let body = batch
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?
                .join("\n");

            self.retry
                .run("upsert_batch", || {
                    let request = self
                        .client
                        .post(&url)
                        .header("Content-Type", "application/x-ndjson")
                        .body(body.clone());
                    self.execute("/records/upsert", request)
                })
                .await?;

            upserted += batch.len();
            tracing::info!(
                namespace = %namespace,
                batch = index + 1,
                total_batches,
                records = batch.len(),
                "upserted batch"
            );

            tokio::time::sleep(self.tuning.batch_pause).await;
        }

        Ok(upserted)
    }

    /// Polls the stats endpoint until `namespace` holds at least `expected`
    /// records. Returns the observed count, or a timeout error carrying the
    /// last count seen once `max_wait` has elapsed.
    pub async fn wait_for_records(
        &self,
        namespace: &str,
        expected: u64,
        max_wait: Duration,
    ) -> AssistantResult<u64> {
        let started = Instant::now();
        let mut observed = 0;

        loop {
            match self.get_index_stats().await {
                Ok(stats) => {
                    observed = stats.record_count(namespace);
                    if observed >= expected {
                        tracing::info!(
                            namespace = %namespace,
                            observed,
                            expected,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "index caught up"
                        );
                        return Ok(observed);
                    }
                    tracing::debug!(namespace = %namespace, observed, expected, "waiting for index");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "stats poll failed, will poll again");
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= max_wait {
                return Err(AssistantError::ConsistencyTimeout {
                    namespace: namespace.to_string(),
                    expected,
                    observed,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.tuning.poll_interval).await;
        }
    }

    /// Plain semantic query, best match first.
    pub async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AssistantResult<SearchResults> {
        if top_k == 0 {
            return Ok(SearchResults::default());
        }
        let body = SearchRequest {
            query: SearchQuery {
                inputs: SearchInputs { text: query },
                top_k,
                filter,
            },
            rerank: None,
        };
        self.run_search(namespace, &body).await
    }

    /// Semantic query over `top_k * 2` candidates, reranked on `content`,
    /// truncated to `top_k`.
    pub async fn search_with_rerank(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AssistantResult<SearchResults> {
        if top_k == 0 {
            return Ok(SearchResults::default());
        }
        let body = SearchRequest {
            query: SearchQuery {
                inputs: SearchInputs { text: query },
                top_k: top_k * 2,
                filter,
            },
            rerank: Some(RerankSpec {
                model: &self.tuning.rerank_model,
                top_n: top_k,
                rank_fields: ["content"],
            }),
        };
        let mut results = self.run_search(namespace, &body).await?;
        results.hits.truncate(top_k);
        Ok(results)
    }

    async fn run_search(
        &self,
        namespace: &str,
        body: &SearchRequest<'_>,
    ) -> AssistantResult<SearchResults> {
        let request = self.client.post(self.namespace_url(namespace, "search")).json(body);
        let response: SearchResponse = self.execute_json("/records/search", request).await?;

        let mut hits: Vec<SearchHit> = response.result.hits;
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        tracing::debug!(namespace = %namespace, hits = hits.len(), "search completed");
        Ok(SearchResults { hits })
    }

    /// Every record id in `namespace`, optionally restricted to ids starting
    /// with `prefix`. Follows the pagination cursor to the end.
    pub async fn list_all_ids(
        &self,
        namespace: &str,
        prefix: Option<&str>,
    ) -> AssistantResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?namespace={}&limit={}",
                self.url("/vectors/list"),
                urlencoding::encode(namespace),
                self.tuning.list_page_size
            );
            if let Some(prefix) = prefix {
                url.push_str(&format!("&prefix={}", urlencoding::encode(prefix)));
            }
            if let Some(token) = &token {
                url.push_str(&format!("&paginationToken={}", urlencoding::encode(token)));
            }

            let page: ListResponse = self.execute_json("/vectors/list", self.client.get(&url)).await?;
            ids.extend(page.vectors.into_iter().map(|record| record.id));

            token = page.pagination.and_then(|p| p.next).filter(|next| !next.is_empty());
            if token.is_none() {
                break;
            }
        }

        Ok(ids)
    }

    pub async fn delete_records(&self, namespace: &str, ids: &[String]) -> AssistantResult<usize> {
        for chunk in ids.chunks(DELETE_CHUNK) {
            let request = self
                .client
                .post(self.url("/vectors/delete"))
                .json(&json!({ "ids": chunk, "namespace": namespace }));
            self.execute("/vectors/delete", request).await?;
        }
        tracing::info!(namespace = %namespace, deleted = ids.len(), "deleted records");
        Ok(ids.len())
    }

    pub async fn delete_namespace(&self, namespace: &str) -> AssistantResult<()> {
        let request = self
            .client
            .post(self.url("/vectors/delete"))
            .json(&json!({ "deleteAll": true, "namespace": namespace }));
        self.execute("/vectors/delete", request).await?;
        tracing::warn!(namespace = %namespace, "purged namespace");
        Ok(())
    }
}
