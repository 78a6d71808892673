use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    middleware,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};

use crate::{
    dtos::{
        accountdtos::{ProfessionalQueryDto, SetApprovalDto},
        ApiResponse,
    },
    error::HttpError,
    middleware::{role_check, AuthSession},
    models::{accountmodel::Role, EntityType},
    AppState,
};

/// Admin-only routes. Mounted behind `auth`.
pub fn admin_handler() -> Router {
    Router::new()
        .route("/professionals", get(list_professionals))
        .route(
            "/professionals/:account_id/approval",
            put(set_professional_approval),
        )
        .route("/messages/pending", get(list_pending_messages))
        .route("/messages/:message_id/approve", put(approve_message))
        .route("/messages/:message_id/reject", put(reject_message))
        .route("/audit/:entity_type/:entity_id", get(get_audit_trail))
        .layer(middleware::from_fn(|req, next| {
            role_check(req, next, vec![Role::Admin])
        }))
}

pub async fn list_professionals(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<ProfessionalQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let professionals = app_state
        .account_service
        .list_professionals(&auth.identity, query.status)
        .await?;

    Ok(Json(ApiResponse::success("Professionals retrieved", professionals)))
}

pub async fn set_professional_approval(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(account_id): Path<String>,
    Json(body): Json<SetApprovalDto>,
) -> Result<impl IntoResponse, HttpError> {
    let account = app_state
        .account_service
        .set_approval(&auth.identity, &account_id, body.approval_status)
        .await?;

    Ok(Json(ApiResponse::success("Approval status updated", account)))
}

pub async fn list_pending_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let messages = app_state
        .moderation_service
        .pending_queue(&auth.identity)
        .await?;

    Ok(Json(ApiResponse::success("Pending messages retrieved", messages)))
}

pub async fn approve_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .moderation_service
        .approve(&auth.identity, &message_id)
        .await?;

    Ok(Json(ApiResponse::success("Message approved", message)))
}

pub async fn reject_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .moderation_service
        .reject(&auth.identity, &message_id)
        .await?;

    Ok(Json(ApiResponse::success("Message rejected", message)))
}

pub async fn get_audit_trail(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> Result<impl IntoResponse, HttpError> {
    let entries = app_state
        .audit_service
        .trail(&auth.identity, entity_type, &entity_id)
        .await?;

    Ok(Json(ApiResponse::success("Audit trail retrieved", entries)))
}
