use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub capacity: i32,
    pub description: Option<String>,
    pub dayprice: f64,
    pub image_url: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Name and rate, as read fresh from the store when issuing a checkout.
// The client-supplied amount is never used for pricing.
#[derive(Debug, FromRow)]
pub struct VenuePricing {
    pub name: String,
    pub dayprice: f64,
}

impl Venue {
    pub async fn find_pricing(
        venue_id: Uuid,
        db: &crate::database::Database,
    ) -> Result<Option<VenuePricing>, sqlx::Error> {
        sqlx::query_as::<_, VenuePricing>("SELECT name, dayprice FROM venues WHERE id = $1")
            .bind(venue_id)
            .fetch_optional(&db.pool)
            .await
    }

    pub async fn list_all(db: &crate::database::Database) -> Result<Vec<Venue>, sqlx::Error> {
        sqlx::query_as::<_, Venue>("SELECT * FROM venues ORDER BY created_at DESC")
            .fetch_all(&db.pool)
            .await
    }

    /// Owner-scoped update: filters by both id and owner_id so a non-owner
    /// affects zero rows. Returns whether a row changed.
    pub async fn update_owned(
        venue_id: Uuid,
        owner_id: Uuid,
        changes: &VenueChanges,
        db: &crate::database::Database,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE venues
            SET name        = COALESCE($3, name),
                address     = COALESCE($4, address),
                capacity    = COALESCE($5, capacity),
                description = COALESCE($6, description),
                dayprice    = COALESCE($7, dayprice),
                image_url   = COALESCE($8, image_url),
                available   = COALESCE($9, available),
                updated_at  = NOW()
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(venue_id)
        .bind(owner_id)
        .bind(&changes.name)
        .bind(&changes.address)
        .bind(changes.capacity)
        .bind(&changes.description)
        .bind(changes.dayprice)
        .bind(&changes.image_url)
        .bind(changes.available)
        .execute(&db.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Owner-scoped delete; same ownership filter as `update_owned`.
    pub async fn delete_owned(
        venue_id: Uuid,
        owner_id: Uuid,
        db: &crate::database::Database,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM venues WHERE id = $1 AND owner_id = $2")
            .bind(venue_id)
            .bind(owner_id)
            .execute(&db.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Partial update payload; None leaves the column as-is
#[derive(Debug, Default, Deserialize)]
pub struct VenueChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub dayprice: Option<f64>,
    pub image_url: Option<String>,
    pub available: Option<bool>,
}
