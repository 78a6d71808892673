use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{
        biddtos::{DraftBidDto, RefuseBidDto, SubmitDraftDto, SubmittedBidDto},
        ApiResponse,
    },
    error::HttpError,
    middleware::{role_check, AuthSession},
    models::accountmodel::Role,
    AppState,
};

pub fn bids_handler() -> Router {
    Router::new()
        .route(
            "/drafts",
            post(save_draft).layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![Role::Professional])
            })),
        )
        .route(
            "/mine",
            get(list_my_bids).layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![Role::Professional])
            })),
        )
        .route("/:bid_id", get(get_bid))
        .route("/:bid_id/submit", put(submit_draft))
        .route("/:bid_id/accept", put(accept_bid))
        .route("/:bid_id/refuse", put(refuse_bid))
        .route("/:bid_id/sign", put(sign_bid))
}

pub async fn save_draft(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(body): Json<DraftBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .save_draft(&auth.identity, &body.request_id, body.lines.into(), body.origin)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Draft saved", bid)),
    ))
}

pub async fn submit_draft(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(bid_id): Path<String>,
    body: Option<Json<SubmitDraftDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let submitted = app_state
        .bid_service
        .submit_draft(&auth.identity, &bid_id, body.totals)
        .await?;

    Ok(Json(ApiResponse::success(
        "Bid submitted",
        SubmittedBidDto::from(submitted),
    )))
}

pub async fn get_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.get(&auth.identity, &bid_id).await?;
    Ok(Json(ApiResponse::success("Bid retrieved", bid)))
}

pub async fn list_my_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state.bid_service.list_mine(&auth.identity).await?;
    Ok(Json(ApiResponse::success("Bids retrieved", bids)))
}

pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state
        .bid_service
        .accept_bid(&auth.identity, &bid_id)
        .await?;
    Ok(Json(ApiResponse::success("Bid accepted", bid)))
}

pub async fn refuse_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(bid_id): Path<String>,
    body: Option<Json<RefuseBidDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .refuse_bid(&auth.identity, &bid_id, body.reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::success("Bid refused", bid)))
}

pub async fn sign_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(bid_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let bid = app_state.bid_service.sign_bid(&auth.identity, &bid_id).await?;
    Ok(Json(ApiResponse::success("Bid signed", bid)))
}
