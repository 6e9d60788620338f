//! Where ingestion gets its catalog from.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storefront_config::CatalogSettings;
use storefront_models::{CatalogExport, CollectionRecord, ProductRecord};
use storefront_observability::log_external_call;

use crate::errors::{AssistantError, AssistantResult};

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human readable origin, used in logs and error messages.
    fn describe(&self) -> String;

    async fn load(&self) -> AssistantResult<CatalogExport>;
}

/// A catalog export saved as JSON: `{"products": [...], "collections": [...]}`.
pub struct JsonFileCatalogSource {
    path: PathBuf,
}

impl JsonFileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalogSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn load(&self) -> AssistantResult<CatalogExport> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AssistantError::NoCatalogData(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let export: CatalogExport = serde_json::from_str(&raw).map_err(|e| {
            AssistantError::Catalog(format!("{} is not a catalog export: {}", self.path.display(), e))
        })?;
        tracing::info!(
            path = %self.path.display(),
            products = export.products.len(),
            collections = export.collections.len(),
            "loaded catalog export"
        );
        Ok(export)
    }
}

const PAGE_SIZE: u32 = 250;

const PRODUCTS_QUERY: &str = r#"
query Products($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      id title handle description vendor productType tags availableForSale
      priceRange {
        minVariantPrice { amount currencyCode }
        maxVariantPrice { amount currencyCode }
      }
      featuredImage { url altText }
    }
  }
}"#;

const COLLECTIONS_QUERY: &str = r#"
query Collections($first: Int!, $after: String) {
  collections(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes { id title handle description image { url altText } }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProductsData {
    products: Connection<ProductRecord>,
}

#[derive(Debug, Deserialize)]
struct CollectionsData {
    collections: Connection<CollectionRecord>,
}

/// Pulls products and collections from the hosted commerce Storefront API.
pub struct StorefrontCatalogSource {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl StorefrontCatalogSource {
    pub fn new(domain: &str, access_token: impl Into<String>, api_version: &str) -> AssistantResult<Self> {
        let domain = domain
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let endpoint = format!("https://{}/api/{}/graphql.json", domain, api_version);
        Self::with_endpoint(endpoint, access_token)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, access_token: impl Into<String>) -> AssistantResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssistantError::transport("storefront", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        after: Option<&str>,
    ) -> AssistantResult<T> {
        log_external_call!("storefront", "graphql");
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Storefront-Access-Token", &self.access_token)
            .json(&json!({
                "query": query,
                "variables": {"first": PAGE_SIZE, "after": after},
            }))
            .send()
            .await
            .map_err(|e| AssistantError::transport("storefront", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::from_status(status.as_u16(), body));
        }

        let body: GraphQLResponse<T> = response
            .json()
            .await
            .map_err(|e| AssistantError::transport("storefront", e))?;
        if let Some(error) = body.errors.first() {
            return Err(AssistantError::Catalog(error.message.clone()));
        }
        body.data
            .ok_or_else(|| AssistantError::Catalog("response carried no data".to_string()))
    }

    async fn all_products(&self) -> AssistantResult<Vec<ProductRecord>> {
        let mut products = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: ProductsData = self.query(PRODUCTS_QUERY, cursor.as_deref()).await?;
            products.extend(page.products.nodes);
            match page.products.page_info {
                PageInfo { has_next_page: true, end_cursor: Some(next) } => cursor = Some(next),
                _ => break,
            }
        }
        Ok(products)
    }

    async fn all_collections(&self) -> AssistantResult<Vec<CollectionRecord>> {
        let mut collections = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: CollectionsData = self.query(COLLECTIONS_QUERY, cursor.as_deref()).await?;
            collections.extend(page.collections.nodes);
            match page.collections.page_info {
                PageInfo { has_next_page: true, end_cursor: Some(next) } => cursor = Some(next),
                _ => break,
            }
        }
        Ok(collections)
    }
}

#[async_trait]
impl CatalogSource for StorefrontCatalogSource {
    fn describe(&self) -> String {
        format!("storefront {}", self.endpoint)
    }

    async fn load(&self) -> AssistantResult<CatalogExport> {
        let products = self.all_products().await?;
        let collections = self.all_collections().await?;
        tracing::info!(
            products = products.len(),
            collections = collections.len(),
            "fetched catalog from storefront"
        );
        Ok(CatalogExport { products, collections })
    }
}

/// The configured source: an export file if one is set, otherwise the
/// storefront API when both domain and token are present.
pub fn from_settings(settings: &CatalogSettings) -> AssistantResult<Option<Arc<dyn CatalogSource>>> {
    if let Some(path) = &settings.export_path {
        let source: Arc<dyn CatalogSource> = Arc::new(JsonFileCatalogSource::new(path.clone()));
        return Ok(Some(source));
    }
    match (&settings.storefront_domain, &settings.storefront_access_token) {
        (Some(domain), Some(token)) => {
            let source: Arc<dyn CatalogSource> = Arc::new(StorefrontCatalogSource::new(
                domain,
                token.clone(),
                &settings.storefront_api_version,
            )?);
            Ok(Some(source))
        }
        _ => Ok(None),
    }
}
