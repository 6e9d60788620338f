use serde::Deserialize;
use std::collections::HashMap;

/// Name of the toggle controlling catalog grounding of chat turns.
pub const GROUNDING: &str = "Grounding";
/// Name of the toggle exposing the index administration routes.
pub const INDEX_ADMIN: &str = "IndexAdmin";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct FeatureToggles {
    #[serde(flatten)]
    pub flags: HashMap<String, bool>,
}

impl FeatureToggles {
    // Load from a provided path or env var FEATURE_TOGGLES_PATH, defaulting to ./feature-toggles.json
    pub fn from_path(path: Option<String>) -> Self {
        let default_path = std::env::var("FEATURE_TOGGLES_PATH")
            .unwrap_or_else(|_| "feature-toggles.json".to_string());
        let path = path.unwrap_or(default_path);

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "ignoring malformed feature toggles file");
                FeatureToggles::default()
            }),
            Err(_) => FeatureToggles::default(),
        }
    }

    pub fn from_env_path() -> Self {
        Self::from_path(None)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn is_enabled_or(&self, name: &str, default: bool) -> bool {
        self.flags.get(name).copied().unwrap_or(default)
    }

    // Product grounding stays on unless explicitly disabled
    pub fn grounding_enabled(&self) -> bool {
        self.is_enabled_or(GROUNDING, true)
    }

    // Purge and id listing routes
    pub fn index_admin_enabled(&self) -> bool {
        self.is_enabled_or(INDEX_ADMIN, true)
    }

    pub fn enabled_features(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .flags
            .iter()
            .filter(|(_, &enabled)| enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn with_flag(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.flags.insert(name.into(), enabled);
        self
    }
}
