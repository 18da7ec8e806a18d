use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    controllers::{to_api_error, ApiResult},
    middleware::AuthUser,
    models::{venue::VenueChanges, Reservation, Venue},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/venues", get(list_venues))
        .route("/venues/{id}", patch(update_venue))
        .route("/venues/{id}", delete(delete_venue))
        .route("/bookings", get(list_bookings))
}

/// GET /api/venues
async fn list_venues(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let venues = Venue::list_all(&state.db).await.map_err(|e| {
        tracing::error!("Failed to list venues: {:?}", e);
        to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load venues")
    })?;
    Ok((StatusCode::OK, axum::Json(venues)))
}

/// PATCH /api/venues/{id}
///
/// Owner-scoped: the update filters on both venue id and the caller's id,
/// so touching someone else's venue affects zero rows and reads as 404.
async fn update_venue(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<Uuid>,
    user: AuthUser,
    Json(changes): Json<VenueChanges>,
) -> ApiResult<impl IntoResponse> {
    if !user.is_admin() {
        return Err(to_api_error(StatusCode::FORBIDDEN, "Admin role required"));
    }
    if let Some(dayprice) = changes.dayprice {
        if dayprice < 0.0 {
            return Err(to_api_error(StatusCode::BAD_REQUEST, "dayprice must be >= 0"));
        }
    }

    let updated = Venue::update_owned(venue_id, user.user_id, &changes, &state.db)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update venue {}: {:?}", venue_id, e);
            to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update venue")
        })?;

    owned_mutation_response(updated, "Venue updated")
}

/// DELETE /api/venues/{id}
async fn delete_venue(
    State(state): State<Arc<AppState>>,
    Path(venue_id): Path<Uuid>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    if !user.is_admin() {
        return Err(to_api_error(StatusCode::FORBIDDEN, "Admin role required"));
    }

    let deleted = Venue::delete_owned(venue_id, user.user_id, &state.db)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete venue {}: {:?}", venue_id, e);
            to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete venue")
        })?;

    owned_mutation_response(deleted, "Venue deleted")
}

/// Maps the row count of an owner-scoped mutation onto the API contract.
/// Zero rows covers both a missing venue and someone else's venue; either
/// way the caller learns only "not found".
fn owned_mutation_response(
    affected: bool,
    success_message: &str,
) -> ApiResult<(StatusCode, axum::Json<serde_json::Value>)> {
    if !affected {
        return Err(to_api_error(StatusCode::NOT_FOUND, "Venue not found"));
    }
    Ok((StatusCode::OK, axum::Json(json!({ "message": success_message }))))
}

/// GET /api/bookings - the caller's reservations, newest first
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let reservations = Reservation::list_for_user(user.user_id, &state.db)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list reservations for {}: {:?}", user.user_id, e);
            to_api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load bookings")
        })?;
    Ok((StatusCode::OK, axum::Json(reservations)))
}
