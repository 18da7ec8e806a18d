pub mod config;
pub mod controllers;
pub mod database;
pub mod middleware;
pub mod models;
pub mod pricing;
pub mod services;
pub mod session;
pub mod validation;

use std::sync::Arc;

use services::auth::AuthProviderClient;
use services::payment::{CheckoutClient, WebhookVerifier};

// Shared state for all request handlers
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub checkout: CheckoutClient,
    pub webhook_verifier: WebhookVerifier,
    pub auth: Arc<AuthProviderClient>,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        let checkout = CheckoutClient::from_config(&config.payment, &config.circuit_breaker);
        let webhook_verifier = WebhookVerifier::new(&config.payment.webhook_secret);
        let auth = Arc::new(AuthProviderClient::from_config(&config.auth));

        Ok(Arc::new(Self {
            db,
            config,
            checkout,
            webhook_verifier,
            auth,
        }))
    }
}
