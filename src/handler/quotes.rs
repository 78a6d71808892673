use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{
        biddtos::{CreateBidDto, SubmittedBidDto},
        quotedtos::{CreateQuoteRequestDto, PhotoQueryDto, RefuseDto, UpdateQuoteRequestDto},
        ApiResponse,
    },
    error::HttpError,
    middleware::{role_check, AuthSession},
    models::accountmodel::Role,
    AppState,
};

pub fn quotes_handler() -> Router {
    Router::new()
        .route("/", post(create_quote_request).get(list_quote_requests))
        .route(
            "/:request_id",
            get(get_quote_request).put(update_quote_request),
        )
        .route(
            "/:request_id/validate",
            put(validate_quote_request).layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![Role::Admin])
            })),
        )
        .route(
            "/:request_id/refuse",
            put(refuse_quote_request).layer(middleware::from_fn(|req, next| {
                role_check(req, next, vec![Role::Admin])
            })),
        )
        .route("/:request_id/cancel", put(cancel_quote_request))
        .route("/:request_id/photos", post(upload_photo))
        .route(
            "/:request_id/bids",
            post(submit_bid).get(list_bids_for_request),
        )
}

pub async fn create_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(body): Json<CreateQuoteRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .quote_service
        .submit(&auth.identity, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Quote request submitted for validation",
            request,
        )),
    ))
}

pub async fn list_quote_requests(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let requests = app_state.quote_service.list_for(&auth.identity).await?;
    Ok(Json(ApiResponse::success("Quote requests retrieved", requests)))
}

pub async fn get_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .quote_service
        .get(&auth.identity, &request_id)
        .await?;
    Ok(Json(ApiResponse::success("Quote request retrieved", request)))
}

pub async fn update_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
    Json(body): Json<UpdateQuoteRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .quote_service
        .edit(&auth.identity, &request_id, body.into())
        .await?;
    Ok(Json(ApiResponse::success("Quote request updated", request)))
}

pub async fn validate_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .quote_service
        .validate(&auth.identity, &request_id)
        .await?;
    Ok(Json(ApiResponse::success("Quote request validated", request)))
}

pub async fn refuse_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
    body: Option<Json<RefuseDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .quote_service
        .refuse(&auth.identity, &request_id, body.reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::success("Quote request refused", request)))
}

pub async fn cancel_quote_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let request = app_state
        .quote_service
        .cancel(&auth.identity, &request_id)
        .await?;
    Ok(Json(ApiResponse::success("Quote request cancelled", request)))
}

/// Raw image bytes in the body, file name in the query string.
pub async fn upload_photo(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
    Query(query): Query<PhotoQueryDto>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let request = app_state
        .quote_service
        .attach_photo(&auth.identity, &request_id, &query.file_name, body.to_vec())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Photo attached", request)),
    ))
}

pub async fn submit_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
    Json(body): Json<CreateBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let submitted = app_state
        .bid_service
        .submit_bid(&auth.identity, &request_id, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            "Bid submitted",
            SubmittedBidDto::from(submitted),
        )),
    ))
}

pub async fn list_bids_for_request(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state
        .bid_service
        .list_for_request(&auth.identity, &request_id)
        .await?;
    Ok(Json(ApiResponse::success("Bids retrieved", bids)))
}
