use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::reservation::{NewReservation, Reservation},
    pricing::MINOR_UNIT_FACTOR,
    services::payment::{CompletedSession, WebhookEvent, CHECKOUT_COMPLETED},
    validation::DATE_FORMAT,
    AppState,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// POST /api/webhook
///
/// Payment-completion reconciliation. The handler takes the raw body so the
/// signature check runs over byte-exact content before any JSON is trusted
/// (verify-then-parse). Responses follow the processor's redelivery
/// contract: 2xx acknowledges, 400 means a bad request it should not retry,
/// 500 asks for redelivery.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Webhook rejected: missing signature header");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing signature header" })),
        );
    };

    // Fail closed: nothing in the body is trusted until this passes
    if let Err(e) = state.webhook_verifier.verify(&body, signature) {
        tracing::warn!("Webhook rejected: {}", e);
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid signature" })),
        );
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Webhook rejected: unparseable event: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid payload" })),
            );
        }
    };

    if event.event_type != CHECKOUT_COMPLETED {
        tracing::debug!("Ignoring webhook event type {}", event.event_type);
        return (StatusCode::OK, Json(json!({ "received": true })));
    }

    let session = match event.completed_session() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Webhook rejected: malformed completed session: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid payload" })),
            );
        }
    };
    let new = match reservation_from_session(&session) {
        Ok(new) => new,
        Err(reason) => {
            // A verified completed event with broken metadata cannot be
            // retried into anything useful; acknowledge and log it.
            tracing::error!("Webhook session {} has unusable metadata: {}", session.id, reason);
            return (StatusCode::OK, Json(json!({ "received": true })));
        }
    };

    commit_response(Reservation::insert_confirmed(&new, &state.db).await, &new)
}

/// Turns the insert outcome into the processor-facing response. A duplicate
/// delivery (zero rows inserted) is already reconciled, so it acknowledges
/// with 200; only a database error asks for redelivery.
fn commit_response(
    outcome: Result<bool, sqlx::Error>,
    new: &NewReservation,
) -> (StatusCode, Json<serde_json::Value>) {
    match outcome {
        Ok(true) => {
            tracing::info!(
                "Reservation committed for payment {}: venue {}, {} - {}",
                new.payment_id,
                new.venue_id,
                new.start_date,
                new.end_date
            );
        }
        Ok(false) => {
            tracing::warn!(
                "Duplicate webhook delivery for payment {} - reservation already committed",
                new.payment_id
            );
        }
        Err(e) => {
            tracing::error!("Reservation insert failed for payment {}: {:?}", new.payment_id, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to create reservation" })),
            );
        }
    }

    (StatusCode::OK, Json(json!({ "received": true })))
}

/// Maps a verified completed-checkout session onto a reservation row. The
/// total comes from the processor-reported amount actually charged, never
/// from a client-side recomputation.
fn reservation_from_session(session: &CompletedSession) -> Result<NewReservation, String> {
    let metadata = session.metadata.as_ref().ok_or("missing metadata")?;

    let venue_id = Uuid::parse_str(&metadata.venue_id).map_err(|_| "bad venue_id")?;
    let user_id = Uuid::parse_str(&metadata.user_id).map_err(|_| "bad user_id")?;
    let start_date = NaiveDate::parse_from_str(&metadata.start_date, DATE_FORMAT)
        .map_err(|_| "bad start_date")?;
    let end_date =
        NaiveDate::parse_from_str(&metadata.end_date, DATE_FORMAT).map_err(|_| "bad end_date")?;
    let days: i32 = metadata.days.parse().map_err(|_| "bad days")?;

    let payment_id = session
        .payment_intent
        .clone()
        .unwrap_or_else(|| session.id.clone());
    let total_price = session.amount_total.unwrap_or(0) as f64 / MINOR_UNIT_FACTOR;

    Ok(NewReservation {
        venue_id,
        user_id,
        name: metadata.name.clone(),
        phone: metadata.phone.clone(),
        start_date,
        end_date,
        days,
        total_price,
        payment_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment::CheckoutMetadata;

    fn session(metadata: Option<CheckoutMetadata>) -> CompletedSession {
        CompletedSession {
            id: "cs_test_abc".to_string(),
            payment_intent: Some("pi_123".to_string()),
            amount_total: Some(30000),
            metadata,
        }
    }

    fn metadata() -> CheckoutMetadata {
        CheckoutMetadata {
            venue_id: "5e0c5cbb-9183-4b0a-91f6-7f6b8f78a001".to_string(),
            user_id: "9f0a2aee-0d10-47cb-b8d4-16c07f11b002".to_string(),
            start_date: "2025-06-01".to_string(),
            end_date: "2025-06-04".to_string(),
            name: "Alice".to_string(),
            phone: "+12025550123".to_string(),
            days: "3".to_string(),
        }
    }

    #[test]
    fn charged_amount_converts_from_minor_units() {
        let new = reservation_from_session(&session(Some(metadata()))).unwrap();
        assert_eq!(new.total_price, 300.0);
        assert_eq!(new.days, 3);
        assert_eq!(new.payment_id, "pi_123");
        assert_eq!(new.start_date.to_string(), "2025-06-01");
    }

    #[test]
    fn session_id_backs_up_a_missing_payment_intent() {
        let mut s = session(Some(metadata()));
        s.payment_intent = None;
        let new = reservation_from_session(&s).unwrap();
        assert_eq!(new.payment_id, "cs_test_abc");
    }

    #[test]
    fn missing_metadata_is_reported() {
        assert!(reservation_from_session(&session(None)).is_err());
    }

    #[test]
    fn duplicate_delivery_is_acknowledged_not_retried() {
        let new = reservation_from_session(&session(Some(metadata()))).unwrap();

        // Zero rows inserted: the payment_id key already holds a reservation
        let (status, body) = commit_response(Ok(false), &new);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0, json!({ "received": true }));

        let (status, _) = commit_response(Ok(true), &new);
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn insert_failure_requests_redelivery() {
        let new = reservation_from_session(&session(Some(metadata()))).unwrap();
        let (status, body) = commit_response(Err(sqlx::Error::PoolTimedOut), &new);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0, json!({ "error": "Failed to create reservation" }));
    }

    #[test]
    fn malformed_metadata_fields_are_reported() {
        let mut bad = metadata();
        bad.days = "three".to_string();
        assert!(reservation_from_session(&session(Some(bad))).is_err());

        let mut bad = metadata();
        bad.venue_id = "not-a-uuid".to_string();
        assert!(reservation_from_session(&session(Some(bad))).is_err());
    }
}
