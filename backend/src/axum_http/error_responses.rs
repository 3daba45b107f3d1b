use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crates::domain::value_objects::wolfram::ComputeResponse;
use serde::Serialize;
use thiserror::Error;

use crate::usecases::{admin::AdminError, compute::ComputeError};

pub const UPGRADE_URL: &str = "/pricing?upgrade=true";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error body carrying a message object, as returned by the checkout routes.
#[derive(Debug, Serialize)]
pub struct ErrorMessageResponse {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub error: String,
    pub upgrade_url: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Active subscription required")]
    PaymentRequired,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                Json(PaymentRequiredResponse {
                    error: self.to_string(),
                    upgrade_url: UPGRADE_URL.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for ComputeError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ComputeResponse::failure(self.to_string())),
        )
            .into_response()
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        json_error(self.status_code(), self.to_string())
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn json_error_message(
    status: StatusCode,
    message: impl Into<String>,
    details: Option<String>,
) -> Response {
    (
        status,
        Json(ErrorMessageResponse {
            error: ErrorMessage {
                message: message.into(),
                details,
            },
        }),
    )
        .into_response()
}
