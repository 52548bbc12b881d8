//! Database operations for `stores`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

/// A row from the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creates a store owned by `owner_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_store(pool: &PgPool, owner_id: i64, name: &str) -> Result<StoreRow, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(
        "INSERT INTO stores (owner_id, name) VALUES ($1, $2) \
         RETURNING id, owner_id, name, created_at, updated_at",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a store by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the store does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_store(pool: &PgPool, id: i64) -> Result<StoreRow, DbError> {
    sqlx::query_as::<_, StoreRow>(
        "SELECT id, owner_id, name, created_at, updated_at FROM stores WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Whether `submitter_id` owns `store_id`.
///
/// Takes a connection so the check can run inside the upload transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn submitter_has_store_access(
    conn: &mut PgConnection,
    submitter_id: i64,
    store_id: i64,
) -> Result<bool, DbError> {
    let allowed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM stores WHERE id = $1 AND owner_id = $2)",
    )
    .bind(store_id)
    .bind(submitter_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(allowed)
}
