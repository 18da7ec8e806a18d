use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A paid, durable reservation. The only status this system ever writes is
/// 'confirmed': rows exist exactly when a payment completed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub venue_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub total_price: f64,
    pub payment_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewReservation {
    pub venue_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i32,
    pub total_price: f64,
    pub payment_id: String,
}

impl Reservation {
    /// Idempotent confirmed-reservation insert, keyed on payment_id.
    /// Returns false when the payment was already committed (redelivery).
    pub async fn insert_confirmed(
        new: &NewReservation,
        db: &crate::database::Database,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO reservations
                (venue_id, user_id, name, phone, start_date, end_date, days,
                 total_price, payment_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'confirmed')
            ON CONFLICT (payment_id) DO NOTHING
            "#,
        )
        .bind(new.venue_id)
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.days)
        .bind(new.total_price)
        .bind(&new.payment_id)
        .execute(&db.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_user(
        user_id: Uuid,
        db: &crate::database::Database,
    ) -> Result<Vec<Reservation>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&db.pool)
        .await
    }
}
