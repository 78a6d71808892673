use std::fmt;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub logout: bool,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::to_string(&self).map_err(|_| fmt::Error)?)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    InvalidToken,
    TokenNotProvided,
    UserNotAuthenticated,
    AccountRecordMissing,
    PermissionDenied,
    InvalidWebhookSignature,
    ServerError,
}

impl ToString for ErrorMessage {
    fn to_string(&self) -> String {
        self.to_str().to_owned()
    }
}

impl ErrorMessage {
    fn to_str(&self) -> String {
        match self {
            ErrorMessage::InvalidToken => "Authentication token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => {
                "You are not logged in, please provide a token".to_string()
            }
            ErrorMessage::UserNotAuthenticated => {
                "Authentication required. Please log in.".to_string()
            }
            ErrorMessage::AccountRecordMissing => {
                "No account record exists for this session. Please log in again.".to_string()
            }
            ErrorMessage::PermissionDenied => {
                "You are not allowed to perform this action".to_string()
            }
            ErrorMessage::InvalidWebhookSignature => "Invalid webhook signature".to_string(),
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
        }
    }
}

pub const SESSION_COOKIE: &str = "token";
pub const LOGIN_REDIRECT: &str = "/login";

#[derive(Debug, Clone)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
    pub details: Option<Value>,
    /// Ask the client to drop its session.
    pub logout: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
            details: None,
            logout: false,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::FORBIDDEN)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::NOT_FOUND)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::CONFLICT)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::UNPROCESSABLE_ENTITY)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::SERVICE_UNAVAILABLE)
    }

    /// 401 that also clears the session cookie on the client.
    pub fn forced_logout(message: impl Into<String>) -> Self {
        let mut error = Self::unauthorized(message);
        error.logout = true;
        error
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn into_http_response(self) -> Response {
        let redirect = (self.status == StatusCode::UNAUTHORIZED).then(|| LOGIN_REDIRECT.to_string());
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            message: self.message.clone(),
            details: self.details.clone(),
            redirect,
            logout: self.logout,
        });

        let mut response = (self.status, json_response).into_response();
        if self.logout {
            let expired = Cookie::build((SESSION_COOKIE, ""))
                .path("/")
                .max_age(time::Duration::ZERO)
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            if let Ok(value) = HeaderValue::from_str(&expired.to_string()) {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
        }
        response
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpError: message: {}, status: {}", self.message, self.status)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}
