use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid data: {0}")]
    MalformedPayload(#[from] JsonRejection),

    #[error("Invalid data: missing {0}")]
    MissingField(&'static str),

    #[error("Order not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload { .. } | AppError::MissingField { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("{self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
