use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{messagedtos::SendMessageDto, ApiResponse},
    error::HttpError,
    middleware::AuthSession,
    AppState,
};

pub fn messages_handler() -> Router {
    Router::new()
        .route("/", post(send_message))
        .route("/with/:account_id", get(get_conversation))
        .route("/:message_id/read", put(mark_message_read))
}

pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Json(body): Json<SendMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state
        .moderation_service
        .send_message(&auth.identity, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Message sent for moderation", message)),
    ))
}

pub async fn get_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let messages = app_state
        .moderation_service
        .conversation(&auth.identity, &account_id)
        .await?;
    Ok(Json(ApiResponse::success("Conversation retrieved", messages)))
}

pub async fn mark_message_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .moderation_service
        .mark_read(&auth.identity, &message_id)
        .await?;
    Ok(Json(ApiResponse::success("Message marked as read", message)))
}
