//! Payment processor integration.
//!
//! Two halves:
//! 1. `CheckoutClient` creates hosted-checkout sessions over the processor's
//!    form-encoded HTTP API. Calls run through a circuit breaker so a dead
//!    gateway stops eating requests, and carry a bounded timeout.
//! 2. `WebhookVerifier` authenticates inbound completion notifications:
//!    HMAC-SHA256 over `"{timestamp}.{raw body}"` against the shared webhook
//!    secret, checked before any JSON is parsed.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, PaymentConfig};

type HmacSha256 = Hmac<Sha256>;

/// Webhook event type that commits a reservation; everything else is
/// acknowledged and ignored.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker guarding the outbound payment gateway calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: std::sync::RwLock<CircuitState>,
    failure_count: AtomicU32,
    // Unix seconds of the last recorded failure
    last_failure_time: AtomicU64,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: std::sync::RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure_time: AtomicU64::new(0),
            failure_threshold,
            timeout_duration: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn can_execute(&self) -> bool {
        let state = self.state.read().unwrap();

        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let now = Utc::now().timestamp().max(0) as u64;
                let last_failure = self.last_failure_time.load(Ordering::Relaxed);

                if now.saturating_sub(last_failure) >= self.timeout_duration.as_secs() {
                    // Timeout elapsed: allow one probe request
                    drop(state);
                    *self.state.write().unwrap() = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Closed;
                self.failure_count.store(0, Ordering::Relaxed);
                info!("Circuit breaker recovered - transitioning to Closed state");
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_time
            .store(Utc::now().timestamp().max(0) as u64, Ordering::Relaxed);

        let mut state = self.state.write().unwrap();

        match *state {
            CircuitState::Closed => {
                if failure_count >= self.failure_threshold {
                    *state = CircuitState::Open;
                    error!(
                        "Circuit breaker OPENED - {} failures reached threshold {}",
                        failure_count, self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.state.read().unwrap().clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    CircuitOpen,
    #[error("payment gateway error: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("payment gateway unavailable (status {0})")]
    Unavailable(u16),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl PaymentError {
    /// Whether the caller may retry the checkout creation. Only a definitive
    /// gateway rejection (4xx) is final; transport errors, 5xx responses and
    /// an open breaker all clear up on their own.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PaymentError::Rejected(_))
    }
}

/// Booking metadata packed into the checkout session. This is the only
/// channel the webhook reconciler learns the reservation from, so every
/// value is a string and must round-trip exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub venue_id: String,
    pub user_id: String,
    pub start_date: String,
    pub end_date: String,
    pub name: String,
    pub phone: String,
    pub days: String,
}

impl CheckoutMetadata {
    fn form_pairs(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("metadata[venue_id]", &self.venue_id),
            ("metadata[user_id]", &self.user_id),
            ("metadata[start_date]", &self.start_date),
            ("metadata[end_date]", &self.end_date),
            ("metadata[name]", &self.name),
            ("metadata[phone]", &self.phone),
            ("metadata[days]", &self.days),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Client for the processor's hosted-checkout API.
#[derive(Clone)]
pub struct CheckoutClient {
    secret_key: String,
    base_url: String,
    success_url: String,
    cancel_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl CheckoutClient {
    pub fn from_config(config: &PaymentConfig, breaker: &CircuitBreakerConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            circuit_breaker: Arc::new(CircuitBreaker::new(
                breaker.failure_threshold,
                breaker.timeout_seconds,
            )),
        }
    }

    /// Creates a checkout session for a server-priced booking. `amount_minor`
    /// is in cents; the caller converts exactly once via `pricing::to_minor_units`.
    pub async fn create_checkout_session(
        &self,
        venue_name: &str,
        amount_minor: i64,
        metadata: &CheckoutMetadata,
    ) -> Result<CheckoutSession, PaymentError> {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking payment gateway request");
            return Err(PaymentError::CircuitOpen);
        }

        let product_name = format!("Booking for {}", venue_name);
        let description = format!(
            "{} days ({} - {})",
            metadata.days, metadata.start_date, metadata.end_date
        );
        let amount = amount_minor.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", &product_name),
            ("line_items[0][price_data][product_data][description]", &description),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][quantity]", "1"),
            ("success_url", &self.success_url),
            ("cancel_url", &self.cancel_url),
        ];
        params.extend(metadata.form_pairs());

        info!(
            "Creating checkout session: amount_minor={}, days={}",
            amount_minor, metadata.days
        );

        let response = self
            .http_client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("Payment gateway request failed: {:?}", e);
                self.circuit_breaker.record_failure();
                return Err(PaymentError::Gateway(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Raw gateway error stays in the server log only
            error!("Payment gateway returned {}: {}", status, body);
            if status.is_server_error() {
                // A failing gateway counts toward opening the breaker
                self.circuit_breaker.record_failure();
                return Err(PaymentError::Unavailable(status.as_u16()));
            }
            // 4xx means the gateway is up and said no; that does not trip
            // the breaker and the caller should not retry as-is
            self.circuit_breaker.record_success();
            return Err(PaymentError::Rejected(format!("gateway status {}", status)));
        }

        self.circuit_breaker.record_success();
        Ok(response.json::<CheckoutSession>().await?)
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state()
    }
}

// --- Webhook signature verification ---

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Verifies processor-issued webhook signatures against the shared secret.
/// Must be fed the raw, unparsed request body; any buffering upstream has to
/// preserve it byte-exact.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            tolerance_secs: 300,
        }
    }

    /// Checks a `t=<unix>,v1=<hex>` header against the raw body. Accepts if
    /// any `v1` candidate matches and the timestamp is within tolerance.
    pub fn verify(&self, body: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed);
        }

        if (Utc::now().timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        for candidate in candidates {
            let Ok(candidate) = hex::decode(candidate) else {
                continue;
            };
            // Mac::verify_slice gives a constant-time comparison
            if self.mac_for(body, timestamp).verify_slice(&candidate).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Produces a valid header for a payload; the counterpart of `verify`,
    /// used to exercise the round trip in tests.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> String {
        let sig = hex::encode(self.mac_for(body, timestamp).finalize().into_bytes());
        format!("t={},v1={}", timestamp, sig)
    }

    fn mac_for(&self, body: &[u8], timestamp: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(body);
        mac
    }
}

// --- Webhook event payload ---

/// Event envelope. `data` stays raw until the type is known: only completed
/// checkouts need their object decoded, other events are acknowledged as-is.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn completed_session(&self) -> Result<CompletedSession, serde_json::Error> {
        serde_json::from_value(self.data.get("object").cloned().unwrap_or_default())
    }
}

/// The checkout session object carried by a completion event.
#[derive(Debug, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: Option<CheckoutMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_url: String) -> (PaymentConfig, CircuitBreakerConfig) {
        (
            PaymentConfig {
                secret_key: "sk_test_123".to_string(),
                webhook_secret: "whsec_test".to_string(),
                api_url,
                success_url: "http://localhost/bookings?success=true".to_string(),
                cancel_url: "http://localhost/venues?canceled=true".to_string(),
            },
            CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
            },
        )
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

    #[tokio::test]
    async fn create_checkout_session_returns_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("unit_amount%5D=30000"))
            .and(body_string_contains("metadata%5Bdays%5D=3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_abc",
                "url": "https://checkout.example/cs_test_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (payment, breaker) = test_config(server.uri());
        let client = CheckoutClient::from_config(&payment, &breaker);
        let session = client
            .create_checkout_session("Grand Hall", 30000, &metadata())
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_abc");
    }

    #[tokio::test]
    async fn gateway_rejection_is_not_retryable_and_hides_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(
                ResponseTemplate::new(402)
                    .set_body_json(serde_json::json!({"error": {"message": "card declined"}})),
            )
            .mount(&server)
            .await;

        let (payment, breaker) = test_config(server.uri());
        let client = CheckoutClient::from_config(&payment, &breaker);
        let err = client
            .create_checkout_session("Grand Hall", 30000, &metadata())
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(!err.to_string().contains("card declined"));
        // A definitive 4xx answer proves the gateway is up
        assert_eq!(client.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn gateway_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (payment, breaker) = test_config(server.uri());
        let client = CheckoutClient::from_config(&payment, &breaker);
        let err = client
            .create_checkout_session("Grand Hall", 30000, &metadata())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Unavailable(503)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn gateway_server_errors_open_the_breaker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (payment, _) = test_config(server.uri());
        let breaker = CircuitBreakerConfig {
            failure_threshold: 2,
            timeout_seconds: 60,
        };
        let client = CheckoutClient::from_config(&payment, &breaker);

        for _ in 0..2 {
            let err = client
                .create_checkout_session("Grand Hall", 30000, &metadata())
                .await
                .unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(client.circuit_state(), CircuitState::Open);

        let err = client
            .create_checkout_session("Grand Hall", 30000, &metadata())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::CircuitOpen));
    }

    #[test]
    fn circuit_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, 60);
        assert!(breaker.can_execute());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn signature_round_trip_verifies() {
        let verifier = WebhookVerifier::new("whsec_test");
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = verifier.sign(body, Utc::now().timestamp());
        assert_eq!(verifier.verify(body, &header), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let verifier = WebhookVerifier::new("whsec_test");
        let body = br#"{"amount_total":30000}"#;
        let header = verifier.sign(body, Utc::now().timestamp());
        let tampered = br#"{"amount_total":99999}"#;
        assert_eq!(verifier.verify(tampered, &header), Err(SignatureError::Mismatch));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let header = WebhookVerifier::new("other_secret").sign(body, Utc::now().timestamp());
        assert_eq!(
            WebhookVerifier::new("whsec_test").verify(body, &header),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let verifier = WebhookVerifier::new("whsec_test");
        let body = b"payload";
        let header = verifier.sign(body, Utc::now().timestamp() - 3600);
        assert_eq!(verifier.verify(body, &header), Err(SignatureError::Expired));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let verifier = WebhookVerifier::new("whsec_test");
        for header in ["", "t=abc", "v1=deadbeef", "t=,v1=", "nonsense"] {
            assert_eq!(
                verifier.verify(b"payload", header),
                Err(SignatureError::Malformed),
                "header {header:?}"
            );
        }
    }

    #[test]
    fn completed_event_parses_metadata_strings_exactly() {
        let raw = serde_json::json!({
            "type": CHECKOUT_COMPLETED,
            "data": { "object": {
                "id": "cs_test_abc",
                "payment_intent": "pi_123",
                "amount_total": 30000,
                "metadata": {
                    "venue_id": "5e0c5cbb-9183-4b0a-91f6-7f6b8f78a001",
                    "user_id": "9f0a2aee-0d10-47cb-b8d4-16c07f11b002",
                    "start_date": "2025-06-01",
                    "end_date": "2025-06-04",
                    "name": "Alice",
                    "phone": "+12025550123",
                    "days": "3"
                }
            }}
        });
        let event: WebhookEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.event_type, CHECKOUT_COMPLETED);
        let session = event.completed_session().unwrap();
        assert_eq!(session.metadata.unwrap(), metadata());
    }
}
