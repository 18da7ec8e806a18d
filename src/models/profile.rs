use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Coarse authorization tier gating admin venue management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

/// Fallback profile record; role resolution consults this when the auth
/// provider's metadata carries no role.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub async fn find_role(
        user_id: Uuid,
        db: &crate::database::Database,
    ) -> Result<Option<UserRole>, sqlx::Error> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM user_details WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&db.pool)
                .await?;
        Ok(role.as_deref().and_then(UserRole::parse))
    }

    /// Inserts the companion profile row; a pre-existing row is left untouched.
    pub async fn ensure(
        user_id: Uuid,
        email: &str,
        full_name: &str,
        role: UserRole,
        db: &crate::database::Database,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_details (id, email, full_name, role)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(email)
        .bind(full_name)
        .bind(role.as_str())
        .execute(&db.pool)
        .await?;
        Ok(())
    }
}
