use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    controllers::{to_api_error, ApiResult},
    models::Venue,
    pricing,
    services::payment::CheckoutMetadata,
    validation::BookingIntent,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/create-payment-intent", post(create_checkout))
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub venue_id: Uuid,
    pub name: String,
    pub phone: String,
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "endDate")]
    pub end_date: String,
    /// Display hint from the client; pricing is always recomputed server-side.
    pub amount: Option<f64>,
    pub days: Option<i64>,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// POST /api/create-payment-intent
///
/// Validates the intent, reprices it from the stored day-rate and asks the
/// payment processor for a hosted-checkout session. No reservation is
/// written here; that happens only when the completion webhook arrives.
async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let intent = BookingIntent {
        name: req.name.clone(),
        phone: req.phone.clone(),
        start_date: req.start_date.clone(),
        end_date: req.end_date.clone(),
    };

    let errors = intent.validate(Utc::now().date_naive());
    if !errors.is_empty() {
        let message = errors.values().cloned().collect::<Vec<_>>().join("; ");
        return Err(to_api_error(StatusCode::BAD_REQUEST, &message));
    }

    let venue = Venue::find_pricing(req.venue_id, &state.db)
        .await
        .map_err(|e| {
            tracing::error!("Database error while loading venue {}: {:?}", req.venue_id, e);
            to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or_else(|| to_api_error(StatusCode::NOT_FOUND, "Venue not found"))?;

    // Server-side price is authoritative; the dates passed validation above
    let (start, end) = intent
        .dates()
        .ok_or_else(|| to_api_error(StatusCode::BAD_REQUEST, "Invalid dates"))?;
    let quote = pricing::quote(start, end, venue.dayprice);

    if let Some(claimed) = req.amount {
        if (claimed - quote.total_price).abs() > f64::EPSILON {
            tracing::warn!(
                "Client-supplied amount {} disagrees with server price {} for venue {}",
                claimed,
                quote.total_price,
                req.venue_id
            );
        }
    }

    let metadata = CheckoutMetadata {
        venue_id: req.venue_id.to_string(),
        user_id: req.user_id.to_string(),
        start_date: req.start_date.trim().to_string(),
        end_date: req.end_date.trim().to_string(),
        name: req.name,
        phone: req.phone,
        days: quote.days.to_string(),
    };

    let session = state
        .checkout
        .create_checkout_session(&venue.name, pricing::to_minor_units(quote.total_price), &metadata)
        .await
        .map_err(|e| {
            tracing::error!("Checkout session creation failed: {}", e);
            to_api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Payment initiation failed. Please try again later.",
            )
        })?;

    tracing::info!(
        "Checkout session {} created for venue {}: {} days, total {}",
        session.id,
        req.venue_id,
        quote.days,
        quote.total_price
    );

    Ok((StatusCode::OK, axum::Json(json!({ "sessionId": session.id }))))
}
