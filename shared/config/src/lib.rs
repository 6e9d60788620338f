//! Environment-driven configuration for the storefront assistant.
//!
//! Credentials are optional at load time; the component that needs one asks
//! for it through an accessor that returns [`ConfigError::Missing`], so a
//! missing key degrades into an explicit configuration error instead of a
//! startup panic.

pub mod feature_toggles;

use feature_toggles::FeatureToggles;
use std::path::PathBuf;
use thiserror::Error;

pub const VECTOR_INDEX_API_KEY: &str = "VECTOR_INDEX_API_KEY";
pub const VECTOR_INDEX_HOST: &str = "VECTOR_INDEX_HOST";
pub const VECTOR_INDEX_NAME: &str = "VECTOR_INDEX_NAME";
pub const VECTOR_INDEX_NAMESPACE: &str = "VECTOR_INDEX_NAMESPACE";
pub const VECTOR_INDEX_API_VERSION: &str = "VECTOR_INDEX_API_VERSION";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const CATALOG_EXPORT_PATH: &str = "CATALOG_EXPORT_PATH";
pub const STOREFRONT_DOMAIN: &str = "STOREFRONT_DOMAIN";
pub const STOREFRONT_ACCESS_TOKEN: &str = "STOREFRONT_ACCESS_TOKEN";
pub const ASSISTANT_HOST: &str = "ASSISTANT_HOST";
pub const ASSISTANT_PORT: &str = "ASSISTANT_PORT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Connection settings for the hosted vector index.
#[derive(Clone)]
pub struct IndexSettings {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub name: String,
    pub namespace: String,
    pub api_version: String,
}

impl IndexSettings {
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing(VECTOR_INDEX_API_KEY))
    }

    /// Base URL of the index data plane, with a scheme and no trailing slash.
    pub fn host_url(&self) -> Result<String, ConfigError> {
        let host = self.host.as_deref().ok_or(ConfigError::Missing(VECTOR_INDEX_HOST))?;
        let host = host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            Ok(host.to_string())
        } else {
            Ok(format!("https://{}", host))
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.host.is_some()
    }
}

#[derive(Clone)]
pub struct CompletionSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
}

impl CompletionSettings {
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::Missing(OPENAI_API_KEY))
    }
}

/// Where ingestion reads the catalog from.
#[derive(Clone, Default)]
pub struct CatalogSettings {
    pub export_path: Option<PathBuf>,
    pub storefront_domain: Option<String>,
    pub storefront_access_token: Option<String>,
    pub storefront_api_version: String,
}

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct AssistantConfig {
    pub index: IndexSettings,
    pub completion: CompletionSettings,
    pub catalog: CatalogSettings,
    pub server: ServerSettings,
    pub feature_toggles: FeatureToggles,
}

impl AssistantConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let toggles = FeatureToggles::from_env_path();
        Self::from_lookup(|key| std::env::var(key).ok(), toggles)
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F, feature_toggles: FeatureToggles) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(ASSISTANT_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: ASSISTANT_PORT,
                value: raw,
            })?,
            None => 3001,
        };

        Ok(Self {
            index: IndexSettings {
                api_key: get(VECTOR_INDEX_API_KEY),
                host: get(VECTOR_INDEX_HOST),
                name: get(VECTOR_INDEX_NAME).unwrap_or_else(|| "storefront".to_string()),
                namespace: get(VECTOR_INDEX_NAMESPACE).unwrap_or_else(|| "catalog".to_string()),
                api_version: get(VECTOR_INDEX_API_VERSION).unwrap_or_else(|| "2025-04".to_string()),
            },
            completion: CompletionSettings {
                api_key: get(OPENAI_API_KEY),
                base_url: get(OPENAI_BASE_URL)
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: get(OPENAI_MODEL).unwrap_or_else(|| "gpt-4o-mini".to_string()),
                max_tokens: get("OPENAI_MAX_TOKENS").and_then(|v| v.parse().ok()),
            },
            catalog: CatalogSettings {
                export_path: get(CATALOG_EXPORT_PATH).map(PathBuf::from),
                storefront_domain: get(STOREFRONT_DOMAIN),
                storefront_access_token: get(STOREFRONT_ACCESS_TOKEN),
                storefront_api_version: get("STOREFRONT_API_VERSION")
                    .unwrap_or_else(|| "2024-10".to_string()),
            },
            server: ServerSettings {
                host: get(ASSISTANT_HOST).unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            feature_toggles,
        })
    }
}
