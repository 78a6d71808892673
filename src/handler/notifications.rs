use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, put},
    Extension, Json, Router,
};
use futures::{Stream, StreamExt};

use crate::{
    dtos::{ApiResponse, NotificationQueryDto},
    error::HttpError,
    middleware::AuthSession,
    AppState,
};

pub fn notifications_handler() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/read-all", put(mark_all_notifications_read))
        .route("/stream", get(stream_notifications))
        .route("/:notification_id/read", put(mark_notification_read))
}

pub async fn list_notifications(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<NotificationQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let notifications = app_state
        .notification_service
        .list(&auth.identity, query.unread_only)
        .await?;
    Ok(Json(ApiResponse::success("Notifications retrieved", notifications)))
}

pub async fn mark_notification_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .notification_service
        .mark_read(&auth.identity, &notification_id)
        .await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "Notification marked as read",
    })))
}

pub async fn mark_all_notifications_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .notification_service
        .mark_all_read(&auth.identity)
        .await?;
    Ok(Json(ApiResponse::success(
        "Notifications marked as read",
        serde_json::json!({ "updated": updated }),
    )))
}

/// Server-sent events carrying the caller's full notification list each
/// time it changes. Closing the connection drops the subscription.
pub async fn stream_notifications(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    let subscription = app_state
        .notification_service
        .subscribe(&auth.identity)
        .await?;
    tracing::info!("📡 Notification stream opened for {}", auth.identity.account_id);

    let stream = subscription.into_stream().map(|snapshot| {
        let event = match snapshot {
            Ok(notifications) => Event::default()
                .event("notifications")
                .json_data(&notifications)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
