use actix_web::{web, HttpResponse, Result};

use crate::state::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "storefront-assistant",
        "indexConfigured": state.index.is_some(),
        "completionConfigured": state.chat.completion_configured(),
        "grounding": state.chat.grounding_enabled(),
        "features": state.config.feature_toggles.enabled_features(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
