use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::{
    db::store::StoreError,
    error::{ErrorMessage, HttpError},
    models::EntityType,
    utils::{content_filter::SensitiveCategory, pricing::AmountOverflow},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("No account record exists for principal {0}")]
    AccountRecordMissing(String),

    #[error("Role not allowed to {0}")]
    NotAuthorizedRole(String),

    #[error("Account {account_id} does not own {entity} {id}")]
    NotOwner {
        entity: EntityType,
        id: String,
        account_id: String,
    },

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: EntityType,
        from: String,
        to: String,
    },

    #[error("Message contains contact details: {}", join_categories(.categories))]
    SensitiveContent { categories: Vec<SensitiveCategory> },

    #[error("Quote request {request_id} is not open for bids (status {status})")]
    RequestNotValidated { request_id: String, status: String },

    #[error("Professional account {0} is not approved")]
    ProfessionalNotApproved(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityType, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failure reported by an external collaborator (push, blob, e-signature).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Request(err.to_string())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

impl From<CollaboratorError> for ServiceError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Rejected(reason) => ServiceError::Validation(reason),
            other => ServiceError::Collaborator(other.to_string()),
        }
    }
}

impl From<AmountOverflow> for ServiceError {
    fn from(err: AmountOverflow) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

fn join_categories(categories: &[SensitiveCategory]) -> String {
    categories
        .iter()
        .map(|category| category.to_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ServiceError {
    pub fn not_found(entity: EntityType, id: &str) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn not_owner(entity: EntityType, id: &str, account_id: &str) -> Self {
        ServiceError::NotOwner {
            entity,
            id: id.to_string(),
            account_id: account_id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthenticated | ServiceError::AccountRecordMissing(_) => {
                StatusCode::UNAUTHORIZED
            }

            ServiceError::NotAuthorizedRole(_)
            | ServiceError::NotOwner { .. }
            | ServiceError::ProfessionalNotApproved(_) => StatusCode::FORBIDDEN,

            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,

            ServiceError::InvalidTransition { .. } | ServiceError::RequestNotValidated { .. } => {
                StatusCode::CONFLICT
            }

            ServiceError::SensitiveContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Collaborator(_) => StatusCode::BAD_GATEWAY,

            ServiceError::Store(store) => match store {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::AlreadyExists { .. } | StoreError::VersionConflict { .. } => {
                    StatusCode::CONFLICT
                }
                StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
                error if error.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        match error {
            ServiceError::Unauthenticated => {
                HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string())
            }

            ServiceError::AccountRecordMissing(_) => {
                HttpError::forced_logout(ErrorMessage::AccountRecordMissing.to_string())
            }

            ServiceError::InvalidTransition { entity, ref from, ref to } => {
                let details = json!({
                    "entity": entity.to_str(),
                    "currentState": from,
                    "attemptedState": to,
                });
                HttpError::new(error.to_string(), status).with_details(details)
            }

            ServiceError::SensitiveContent { ref categories } => {
                let details = json!({ "categories": categories });
                HttpError::new(error.to_string(), status).with_details(details)
            }

            ServiceError::Store(ref store) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("❌ Store failure: {}", store);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }

            _ => HttpError::new(error.to_string(), status),
        }
    }
}
