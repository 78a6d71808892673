use std::sync::Arc;

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};

use crate::{
    dtos::biddtos::PaymentWebhookDto,
    error::{ErrorMessage, HttpError},
    utils::webhook::verify_signature,
    AppState,
};

pub const SIGNATURE_HEADER: &str = "x-payment-signature";
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

pub fn payments_handler() -> Router {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Payment provider callback. The body is authenticated before it is parsed.
pub async fn payment_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| HttpError::bad_request("Missing payment signature"))?;

    if !verify_signature(&body, signature, &app_state.env.payment_webhook_secret) {
        tracing::warn!("Invalid payment webhook signature received");
        return Err(HttpError::unauthorized(
            ErrorMessage::InvalidWebhookSignature.to_string(),
        ));
    }

    let payload: PaymentWebhookDto = serde_json::from_slice(&body)
        .map_err(|e| HttpError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    if payload.event != PAYMENT_SUCCEEDED {
        tracing::info!("Unhandled payment webhook event: {}", payload.event);
        return Ok(Json(serde_json::json!({"status": "success", "processed": false})));
    }

    let outcome = app_state
        .bid_service
        .record_payment(&payload.data.bid_id, &payload.data.reference)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "processed": outcome.is_applied(),
        "data": outcome.entity(),
    })))
}
