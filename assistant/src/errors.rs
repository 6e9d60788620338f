use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use storefront_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("API error ({status}): {body}")]
    TransientService { status: u16, body: String },

    #[error("API error ({status}): {body}")]
    PermanentService { status: u16, body: String },

    #[error(
        "Namespace '{namespace}' reached {observed} of {expected} records after {waited_secs}s"
    )]
    ConsistencyTimeout {
        namespace: String,
        expected: u64,
        observed: u64,
        waited_secs: u64,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Index not found: {0}")]
    IndexMissing(String),

    #[error("No catalog data: {0}")]
    NoCatalogData(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Catalog source error: {0}")]
    Catalog(String),

    #[error("Upstream stream error: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AssistantError {
    /// Classifies a non-success HTTP status. Rate limiting and server errors
    /// are worth retrying, everything else is not.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || (500..600).contains(&status) {
            AssistantError::TransientService { status, body }
        } else {
            AssistantError::PermanentService { status, body }
        }
    }

    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        AssistantError::Transport { service, source }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AssistantError::TransientService { .. })
    }

    /// HTTP status of a failed service call, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AssistantError::TransientService { status, .. }
            | AssistantError::PermanentService { status, .. } => Some(*status),
            AssistantError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            AssistantError::Configuration(_) => {
                Some("check the service environment variables and restart")
            }
            AssistantError::IndexMissing(_) => Some("create the index first"),
            AssistantError::NoCatalogData(_) => {
                Some("set CATALOG_EXPORT_PATH or the storefront credentials")
            }
            AssistantError::FeatureDisabled(_) => Some("enable the feature in the toggles file"),
            AssistantError::ConsistencyTimeout { .. } => {
                Some("records were written; the index may still be catching up")
            }
            _ => None,
        }
    }
}

impl ResponseError for AssistantError {
    fn status_code(&self) -> StatusCode {
        match self {
            AssistantError::InvalidRequest(_)
            | AssistantError::IndexMissing(_)
            | AssistantError::NoCatalogData(_) => StatusCode::BAD_REQUEST,
            AssistantError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        if let Some(hint) = self.hint() {
            body["hint"] = serde_json::Value::from(hint);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type AssistantResult<T> = Result<T, AssistantError>;
