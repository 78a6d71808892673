// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    handler::{
        accounts::accounts_handler, admin::admin_handler, bids::bids_handler,
        messages::messages_handler, notifications::notifications_handler,
        payments::payments_handler, quotes::quotes_handler,
    },
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(&app_state.env.blob_dir);

    let api_route = Router::new()
        .nest("/accounts", accounts_handler())
        .nest("/admin", admin_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/quote-requests",
            quotes_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/bids", bids_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/messages",
            messages_handler().layer(middleware::from_fn(auth)),
        )
        .nest(
            "/notifications",
            notifications_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/payments", payments_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .nest_service("/uploads", uploads)
}
