use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("courier is not eligible")]
    CourierNotEligible,

    #[error("courier is currently delivering")]
    CourierDelivering,

    #[error("order is not cancelable")]
    OrderNotCancelable,

    #[error("cannot reassign delivered, cancelled or picked-up orders")]
    OrderNotReassignable,

    #[error("cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("invalid location format: {0}")]
    InvalidLocationFormat(String),

    #[error("both lat and lng must be provided together")]
    MalformedLocationPair,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::PasswordTooShort { .. }
            | AppError::InvalidLocationFormat(_)
            | AppError::MalformedLocationPair
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CourierNotEligible
            | AppError::CourierDelivering
            | AppError::OrderNotCancelable
            | AppError::OrderNotReassignable
            | AppError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
