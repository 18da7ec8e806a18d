pub mod auth;
pub mod checkout;
pub mod venues;
pub mod webhook;

use axum::http::StatusCode;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(checkout::routes())
        .merge(webhook::routes())
        .merge(auth::routes())
        .merge(venues::routes())
}

// --- Shared error shape ---

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn to_api_error(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}
