use std::sync::Arc;
use storefront_config::AssistantConfig;

use crate::errors::{AssistantError, AssistantResult};
use crate::services::catalog_source::{self, CatalogSource};
use crate::services::chat::ChatService;
use crate::services::completion::{CompletionProvider, OpenAiCompletionClient};
use crate::services::grounding::ProductGrounding;
use crate::services::ingestion::IngestionPipeline;
use crate::services::query::QueryPipeline;
use crate::services::vector_index::VectorIndexClient;

/// Shared application state, built once at startup and handed to every
/// worker through `web::Data`.
pub struct AppState {
    pub config: AssistantConfig,
    pub index: Option<Arc<VectorIndexClient>>,
    pub ingestion: Option<Arc<IngestionPipeline>>,
    pub query: Option<Arc<QueryPipeline>>,
    pub catalog: Option<Arc<dyn CatalogSource>>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Missing credentials leave the matching component unset; the routes
    /// that need it answer with a configuration error.
    pub fn new(config: AssistantConfig) -> AssistantResult<Self> {
        let index = match VectorIndexClient::from_settings(&config.index) {
            Ok(client) => Some(Arc::new(client)),
            Err(AssistantError::Configuration(e)) => {
                tracing::warn!(error = %e, "vector index not configured, ingestion and grounding disabled");
                None
            }
            Err(e) => return Err(e),
        };

        let completion: Option<Arc<dyn CompletionProvider>> =
            match OpenAiCompletionClient::from_settings(&config.completion) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn CompletionProvider>),
                Err(AssistantError::Configuration(e)) => {
                    tracing::warn!(error = %e, "completion service not configured, /chat will fail");
                    None
                }
                Err(e) => return Err(e),
            };

        let catalog = catalog_source::from_settings(&config.catalog)?;
        match &catalog {
            Some(source) => tracing::info!(source = %source.describe(), "catalog source configured"),
            None => tracing::warn!("no catalog source configured, POST /ingest will fail"),
        }

        Ok(Self::from_parts(config, index, completion, catalog))
    }

    /// Wires pipelines and chat from already built clients.
    pub fn from_parts(
        config: AssistantConfig,
        index: Option<Arc<VectorIndexClient>>,
        completion: Option<Arc<dyn CompletionProvider>>,
        catalog: Option<Arc<dyn CatalogSource>>,
    ) -> Self {
        let namespace = config.index.namespace.clone();
        let ingestion = index
            .as_ref()
            .map(|index| Arc::new(IngestionPipeline::new(index.clone(), namespace.clone())));
        let query = index
            .as_ref()
            .map(|index| Arc::new(QueryPipeline::new(index.clone(), namespace.clone())));

        let grounding_enabled = config.feature_toggles.grounding_enabled();
        storefront_observability::log_feature!("Grounding", grounding_enabled);
        let grounding = query
            .as_ref()
            .filter(|_| grounding_enabled)
            .map(|query| ProductGrounding::new(query.clone()));

        Self {
            chat: Arc::new(ChatService::new(completion, grounding)),
            config,
            index,
            ingestion,
            query,
            catalog,
        }
    }

    /// The index client, or the configuration error explaining its absence.
    pub fn index(&self) -> AssistantResult<&Arc<VectorIndexClient>> {
        match &self.index {
            Some(index) => Ok(index),
            None => {
                self.config.index.api_key()?;
                self.config.index.host_url()?;
                Err(AssistantError::IndexMissing(self.config.index.name.clone()))
            }
        }
    }

    pub fn ingestion(&self) -> AssistantResult<&Arc<IngestionPipeline>> {
        self.index()?;
        self.ingestion
            .as_ref()
            .ok_or_else(|| AssistantError::IndexMissing(self.config.index.name.clone()))
    }

    pub fn require_index_admin(&self) -> AssistantResult<()> {
        let enabled = self.config.feature_toggles.index_admin_enabled();
        storefront_observability::log_feature!("IndexAdmin", enabled);
        if enabled {
            Ok(())
        } else {
            Err(AssistantError::FeatureDisabled("IndexAdmin"))
        }
    }
}
