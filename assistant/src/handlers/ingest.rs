use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::errors::{AssistantError, AssistantResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    pub namespace: Option<String>,
    #[serde(default)]
    pub prune: bool,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListIdsQuery {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
}

/// POST /ingest
pub async fn ingest_catalog(
    state: web::Data<AppState>,
    body: Option<web::Json<IngestRequest>>,
) -> AssistantResult<HttpResponse> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let pipeline = state.ingestion()?;
    let index = state.index()?;

    if !index.index_exists().await {
        return Err(AssistantError::IndexMissing(state.config.index.name.clone()));
    }

    let source = state.catalog.as_ref().ok_or_else(|| {
        AssistantError::NoCatalogData("no catalog source is configured".to_string())
    })?;
    let export = source.load().await?;
    if export.is_empty() {
        return Err(AssistantError::NoCatalogData(format!(
            "{} contains no products or collections",
            source.describe()
        )));
    }

    let namespace = request
        .namespace
        .filter(|ns| !ns.trim().is_empty())
        .unwrap_or_else(|| pipeline.default_namespace().to_string());

    let summary = if request.prune {
        pipeline.ingest_and_prune(Some(&namespace), &export).await?
    } else {
        pipeline.ingest(Some(&namespace), &export).await?
    };

    tracing::info!(
        namespace = %namespace,
        products = summary.products,
        collections = summary.collections,
        pruned = summary.pruned,
        "ingestion completed"
    );

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "products": summary.products,
        "collections": summary.collections,
        "total": summary.total(),
        "namespace": namespace,
        "pruned": summary.pruned,
    })))
}

/// GET /ingest
pub async fn ingest_status(state: web::Data<AppState>) -> AssistantResult<HttpResponse> {
    let index = state.index()?;
    let stats = match index.get_index_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::debug!(error = %e, "index stats unavailable");
            None
        }
    };
    let exists = stats.is_some();

    let (total, namespaces, namespace_stats) = match &stats {
        Some(stats) => (
            stats.total_record_count,
            stats.namespace_names(),
            stats
                .namespaces
                .iter()
                .map(|(name, summary)| (name.clone(), json!({ "recordCount": summary.record_count })))
                .collect::<BTreeMap<_, _>>(),
        ),
        None => (0, Vec::new(), BTreeMap::new()),
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "indexExists": exists,
        "indexName": state.config.index.name,
        "stats": {
            "totalRecords": total,
            "namespaces": namespaces,
            "namespaceStats": namespace_stats,
        },
    })))
}

/// DELETE /ingest?namespace=
pub async fn purge_namespace(
    state: web::Data<AppState>,
    query: web::Query<NamespaceQuery>,
) -> AssistantResult<HttpResponse> {
    state.require_index_admin()?;
    let index = state.index()?;
    let namespace = query
        .into_inner()
        .namespace
        .unwrap_or_else(|| state.config.index.namespace.clone());

    index.delete_namespace(&namespace).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "namespace": namespace,
    })))
}

/// GET /ingest/ids?namespace=&prefix=
pub async fn list_ids(
    state: web::Data<AppState>,
    query: web::Query<ListIdsQuery>,
) -> AssistantResult<HttpResponse> {
    state.require_index_admin()?;
    let index = state.index()?;
    let ListIdsQuery { namespace, prefix } = query.into_inner();
    let namespace = namespace.unwrap_or_else(|| state.config.index.namespace.clone());

    let ids = index.list_all_ids(&namespace, prefix.as_deref()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "namespace": namespace,
        "count": ids.len(),
        "ids": ids,
    })))
}
