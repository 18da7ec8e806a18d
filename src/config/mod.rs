use serde::Deserialize;
use std::env;

// Top-level configuration container, assembled once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

// Application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

// Database settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Auth provider settings (GoTrue-compatible HTTP API)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub base_url: String,
    pub jwt_secret: String,
}

// Payment processor settings (hosted checkout + signed webhooks)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

// Circuit breaker settings for the outbound payment client
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "venuebook=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            auth: AuthConfig {
                base_url: env::var("AUTH_URL").expect("AUTH_URL must be set"),
                jwt_secret: env::var("AUTH_JWT_SECRET").expect("AUTH_JWT_SECRET must be set"),
            },
            payment: PaymentConfig {
                secret_key: env::var("PAYMENT_SECRET_KEY").expect("PAYMENT_SECRET_KEY must be set"),
                webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")
                    .expect("PAYMENT_WEBHOOK_SECRET must be set"),
                api_url: env::var("PAYMENT_API_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                success_url: env::var("PAYMENT_SUCCESS_URL").unwrap_or_else(|_| {
                    "http://localhost:3000/bookings?success=true&session_id={CHECKOUT_SESSION_ID}"
                        .to_string()
                }),
                cancel_url: env::var("PAYMENT_CANCEL_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/venues?canceled=true".to_string()),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be a valid number"),
                timeout_seconds: env::var("CIRCUIT_BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_TIMEOUT_SECONDS must be a valid number"),
            },
        }
    }
}
