pub mod chat;
pub mod health;
pub mod ingest;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::resource("/ingest")
                .route(web::post().to(ingest::ingest_catalog))
                .route(web::get().to(ingest::ingest_status))
                .route(web::delete().to(ingest::purge_namespace)),
        )
        .route("/ingest/ids", web::get().to(ingest::list_ids))
        .route("/chat", web::post().to(chat::chat));
}
