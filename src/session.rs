//! Session and role state for an embedding client (the web UI shell).
//!
//! The store is an explicit context object: it owns the current session and
//! resolved role, and it is the only writer. Consumers read snapshots and
//! invoke actions (`sign_in`, `sign_up`, `sign_out`); auth-state changes
//! arriving over the event stream are applied by a subscription task whose
//! lifetime is bounded by `subscribe`/`teardown`.
//!
//! Role precedence everywhere: provider metadata, then the profile row,
//! then default `user` (creating the profile row when none exists).

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::models::{UserProfile, UserRole};
use crate::services::auth::{AuthError, AuthProviderClient, ProviderSession, ProviderUser};

/// Auth-state change notifications, as delivered by the provider bridge.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(ProviderSession),
    TokenRefreshed(ProviderSession),
    SignedOut,
}

#[derive(Debug, Clone)]
struct Snapshot {
    session: ProviderSession,
    role: UserRole,
}

pub struct SessionRoleStore {
    auth: Arc<AuthProviderClient>,
    db: Database,
    state: Arc<RwLock<Option<Snapshot>>>,
    subscription: Option<JoinHandle<()>>,
}

impl SessionRoleStore {
    pub fn new(auth: Arc<AuthProviderClient>, db: Database) -> Self {
        Self {
            auth,
            db,
            state: Arc::new(RwLock::new(None)),
            subscription: None,
        }
    }

    /// Restores an existing session at startup, if the persisted token is
    /// still valid with the provider.
    pub async fn init(&self, persisted_token: Option<&str>) {
        let Some(token) = persisted_token else { return };

        match self.auth.get_user(token).await {
            Ok(Some(user)) => {
                let role = self.resolve_role_or_default(&user).await;
                let session = ProviderSession {
                    access_token: token.to_string(),
                    refresh_token: None,
                    user,
                };
                self.replace(Some(Snapshot { session, role }));
            }
            Ok(None) => {}
            Err(e) => warn!("Session restore failed: {}", e),
        }
    }

    /// Starts applying auth-state changes from the event stream. Each event
    /// replaces session and role together, so readers never observe a role
    /// that is stale relative to the session.
    pub fn subscribe(&mut self, mut events: broadcast::Receiver<AuthEvent>) {
        let db = self.db.clone();
        let state = self.state.clone();

        self.subscription = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Auth event stream lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match event {
                    AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                        let role = resolve_role(&session.user, &db)
                            .await
                            .unwrap_or_else(|e| {
                                warn!("Role resolution failed on auth event: {}", e);
                                session.user.metadata_role().unwrap_or_default()
                            });
                        *state.write().unwrap() = Some(Snapshot { session, role });
                    }
                    AuthEvent::SignedOut => {
                        *state.write().unwrap() = None;
                    }
                }
            }
        }));
    }

    /// Stops the subscription task. Dropping the store does the same.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.abort();
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.auth.sign_in(email, password).await?;
        let role = self.resolve_role_or_default(&session.user).await;
        info!("Signed in {} with role {}", session.user.email, role.as_str());
        self.replace(Some(Snapshot { session, role }));
        Ok(())
    }

    /// Registers a new account and its companion profile row. A profile
    /// insert failure is logged but does not fail the signup: the account
    /// exists and can still verify its email.
    pub async fn sign_up(
        &self,
        email: &str,
        full_name: &str,
        password: &str,
        role: UserRole,
    ) -> Result<(), AuthError> {
        if email.is_empty() || full_name.is_empty() || password.is_empty() {
            return Err(AuthError::Unknown("All fields are required".to_string()));
        }
        if !email_shape_is_valid(email) {
            return Err(AuthError::Unknown("Invalid email format".to_string()));
        }

        let user = self.auth.sign_up(email, password, full_name, role).await?;

        if let Err(e) = UserProfile::ensure(user.id, email, full_name, role, &self.db).await {
            error!("Error creating user details for {}: {}", user.id, e);
        }
        Ok(())
    }

    /// Signs out with the provider. State is cleared only on success; on
    /// failure the session remains whatever it was.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let token = match self.state.read().unwrap().as_ref() {
            Some(snapshot) => snapshot.session.access_token.clone(),
            None => return Ok(()),
        };

        self.auth.sign_out(&token).await?;
        self.replace(None);
        Ok(())
    }

    pub fn session(&self) -> Option<ProviderSession> {
        self.state.read().unwrap().as_ref().map(|s| s.session.clone())
    }

    pub fn role(&self) -> Option<UserRole> {
        self.state.read().unwrap().as_ref().map(|s| s.role)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.state.read().unwrap().as_ref().map(|s| s.session.user.id)
    }

    async fn resolve_role_or_default(&self, user: &ProviderUser) -> UserRole {
        resolve_role(user, &self.db).await.unwrap_or_else(|e| {
            warn!("Profile fetch error for {}: {}", user.id, e);
            user.metadata_role().unwrap_or_default()
        })
    }

    fn replace(&self, snapshot: Option<Snapshot>) {
        *self.state.write().unwrap() = snapshot;
    }
}

impl Drop for SessionRoleStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resolves a user's role: metadata wins, then the profile row; with neither
/// present, a profile row with the default role is created and `user` is
/// returned. Shared with the auth-callback endpoint.
pub async fn resolve_role(user: &ProviderUser, db: &Database) -> Result<UserRole, sqlx::Error> {
    if let Some(role) = user.metadata_role() {
        return Ok(role);
    }
    if let Some(role) = UserProfile::find_role(user.id, db).await? {
        return Ok(role);
    }

    let role = UserRole::default();
    UserProfile::ensure(user.id, &user.email, &user.full_name(), role, db).await?;
    info!("Created default profile for {}", user.id);
    Ok(role)
}

/// Pure precedence rule behind [`resolve_role`], kept separate so the
/// ordering is testable without a database.
pub fn pick_role(metadata_role: Option<UserRole>, profile_role: Option<UserRole>) -> UserRole {
    metadata_role.or(profile_role).unwrap_or_default()
}

// Mirrors the signup form check: local part, '@', domain with a dot,
// no whitespace anywhere.
fn email_shape_is_valid(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_role_takes_precedence_over_profile() {
        assert_eq!(
            pick_role(Some(UserRole::Admin), Some(UserRole::User)),
            UserRole::Admin
        );
    }

    #[test]
    fn profile_role_is_the_fallback() {
        assert_eq!(pick_role(None, Some(UserRole::Admin)), UserRole::Admin);
    }

    #[test]
    fn no_role_anywhere_defaults_to_user() {
        assert_eq!(pick_role(None, None), UserRole::User);
    }

    #[test]
    fn email_shape_check_matches_signup_form() {
        assert!(email_shape_is_valid("alice@example.com"));
        assert!(email_shape_is_valid("a.b+c@mail.example.co"));
        for bad in ["", "alice", "alice@", "@example.com", "alice@example", "a b@example.com"] {
            assert!(!email_shape_is_valid(bad), "{bad:?} should be invalid");
        }
    }

    #[tokio::test]
    async fn sign_up_validates_locally_before_any_network_call() {
        // Provider URL points nowhere; local validation must reject first
        let auth = Arc::new(AuthProviderClient::from_config(&crate::config::AuthConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            jwt_secret: "secret".to_string(),
        }));
        let db = Database {
            pool: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://unused@localhost/unused")
                .unwrap(),
        };
        let store = SessionRoleStore::new(auth, db);

        let err = store
            .sign_up("", "Alice", "hunter22", UserRole::User)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Unknown("All fields are required".to_string()));

        let err = store
            .sign_up("not-an-email", "Alice", "hunter22", UserRole::User)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Unknown("Invalid email format".to_string()));
    }

    #[tokio::test]
    async fn sign_out_without_a_session_is_a_no_op() {
        let auth = Arc::new(AuthProviderClient::from_config(&crate::config::AuthConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            jwt_secret: "secret".to_string(),
        }));
        let db = Database {
            pool: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy("postgres://unused@localhost/unused")
                .unwrap(),
        };
        let store = SessionRoleStore::new(auth, db);
        assert!(store.sign_out().await.is_ok());
        assert!(store.session().is_none());
    }
}
