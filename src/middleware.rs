// middleware.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorMessage, HttpError, SESSION_COOKIE},
    models::accountmodel::Role,
    service::identity_service::Identity,
    utils::token,
    AppState,
};

/// Resolved caller, inserted by [`auth`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthSession {
    pub identity: Identity,
}

/// Token subject, inserted by [`authenticate_principal`] for callers that
/// may not have an account record yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal(pub String);

fn bearer_or_cookie(cookie_jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    cookie_jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|auth_header| auth_header.to_str().ok())
                .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_owned())
        })
        .filter(|token| !token.is_empty())
}

fn principal_from(
    cookie_jar: &CookieJar,
    headers: &HeaderMap,
    app_state: &AppState,
) -> Result<String, HttpError> {
    let token = bearer_or_cookie(cookie_jar, headers)
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    token::decode_token(token, app_state.env.jwt_secret.as_bytes())
}

pub async fn authenticate_principal(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let principal = principal_from(&cookie_jar, req.headers(), &app_state)?;
    req.extensions_mut().insert(Principal(principal));
    Ok(next.run(req).await)
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let principal = principal_from(&cookie_jar, req.headers(), &app_state)?;

    let identity = app_state
        .identity_service
        .resolve(Some(&principal))
        .await
        .map_err(|e| {
            tracing::debug!(principal = %principal, "session rejected: {}", e);
            HttpError::from(e)
        })?;

    req.extensions_mut().insert(AuthSession { identity });
    Ok(next.run(req).await)
}

pub async fn role_check(
    req: Request,
    next: Next,
    required_roles: Vec<Role>,
) -> Result<impl IntoResponse, HttpError> {
    let session = req
        .extensions()
        .get::<AuthSession>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&session.identity.role) {
        tracing::warn!(
            account_id = %session.identity.account_id,
            role = %session.identity.role,
            path = %req.uri().path(),
            "route refused for role"
        );
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(next.run(req).await)
}
