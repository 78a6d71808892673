use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{accountdtos::RegisterAccountDto, ApiResponse},
    error::HttpError,
    middleware::{auth, authenticate_principal, AuthSession, Principal},
    AppState,
};

pub fn accounts_handler() -> Router {
    Router::new()
        .route(
            "/",
            post(register_account).layer(middleware::from_fn(authenticate_principal)),
        )
        .route("/me", get(get_me).layer(middleware::from_fn(auth)))
        .route(
            "/:account_id",
            delete(delete_account).layer(middleware::from_fn(auth)),
        )
}

pub async fn register_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<RegisterAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let account = app_state
        .account_service
        .register(&principal.0, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Account created", account)),
    ))
}

pub async fn get_me(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let account = app_state
        .account_service
        .get_profile(&auth.identity, &auth.identity.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Account retrieved", account)))
}

pub async fn delete_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let report = app_state
        .account_service
        .delete_account(&auth.identity, &account_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Account deleted",
        serde_json::json!({
            "accountId": account_id,
            "cancelledRequests": report.cancelled_requests,
            "refusedBids": report.refused_bids,
        }),
    )))
}
