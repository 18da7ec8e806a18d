//! HTTP client for the external auth provider (GoTrue-compatible API).
//!
//! Provider-specific error strings are translated into the fixed
//! [`AuthError`] taxonomy here so callers can match exhaustively instead of
//! string-matching messages.

use serde::Deserialize;
use serde_json::json;
use tokio::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::UserRole;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Connection error. Please try again.")]
    ConnectionError,
    #[error("Please verify your email address before logging in")]
    EmailNotVerified,
    #[error("Authentication failed: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl ProviderUser {
    /// Role from provider metadata; takes precedence over the profile row.
    pub fn metadata_role(&self) -> Option<UserRole> {
        self.user_metadata
            .get("role")
            .and_then(|v| v.as_str())
            .and_then(UserRole::parse)
    }

    pub fn full_name(&self) -> String {
        self.user_metadata
            .get("full_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: ProviderUser,
}

// Provider error bodies vary by endpoint; accept any of the known shapes
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ProviderErrorBody {
    fn message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Clone)]
pub struct AuthProviderClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl AuthProviderClient {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, AuthError> {
        let response = self
            .http_client
            .post(format!("{}/token?grant_type=password", self.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| {
                error!("Network error during sign in: {:?}", e);
                AuthError::ConnectionError
            })?;

        if response.status().is_success() {
            return response.json::<ProviderSession>().await.map_err(|e| {
                error!("Malformed session payload from auth provider: {:?}", e);
                AuthError::ConnectionError
            });
        }

        Err(Self::translate_error(response).await)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<ProviderUser, AuthError> {
        let response = self
            .http_client
            .post(format!("{}/signup", self.base_url))
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name, "role": role.as_str() }
            }))
            .send()
            .await
            .map_err(|e| {
                error!("Network error during sign up: {:?}", e);
                AuthError::ConnectionError
            })?;

        if response.status().is_success() {
            return response.json::<ProviderUser>().await.map_err(|e| {
                error!("Malformed user payload from auth provider: {:?}", e);
                AuthError::ConnectionError
            });
        }

        Err(Self::translate_error(response).await)
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http_client
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                error!("Network error during sign out: {:?}", e);
                AuthError::ConnectionError
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::translate_error(response).await)
        }
    }

    /// Current user for an existing access token, if the session is alive.
    pub async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, AuthError> {
        let response = self
            .http_client
            .get(format!("{}/user", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|_| AuthError::ConnectionError)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if response.status().is_success() {
            return Ok(response.json::<ProviderUser>().await.ok());
        }
        Err(Self::translate_error(response).await)
    }

    /// Exchanges an email-verification authorization code for a session.
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderSession, AuthError> {
        let response = self
            .http_client
            .post(format!("{}/token?grant_type=pkce", self.base_url))
            .json(&json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|e| {
                error!("Network error during code exchange: {:?}", e);
                AuthError::ConnectionError
            })?;

        if response.status().is_success() {
            return response.json::<ProviderSession>().await.map_err(|e| {
                error!("Malformed session payload from auth provider: {:?}", e);
                AuthError::ConnectionError
            });
        }

        Err(Self::translate_error(response).await)
    }

    async fn translate_error(response: reqwest::Response) -> AuthError {
        let message = match response.json::<ProviderErrorBody>().await {
            Ok(body) => body.message(),
            Err(_) => "Unknown error".to_string(),
        };

        if message.contains("Invalid login credentials") {
            AuthError::InvalidCredentials
        } else if message.contains("Email not confirmed") {
            AuthError::EmailNotVerified
        } else if message.contains("Failed to fetch") {
            AuthError::ConnectionError
        } else {
            AuthError::Unknown(message)
        }
    }
}
