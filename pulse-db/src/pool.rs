//! Pool construction, following `acteon_state_postgres::PostgresStateStore::new`:
//! build a `PgPoolOptions` pool, then run migrations before handing it back.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::map_sqlx;
use crate::migrations;
use pulse_core::PulseError;

/// Connect to `database_url` with `max_connections` and ensure the schema
/// exists.
///
/// # Errors
/// Returns [`PulseError::Db`] if the pool cannot be created, or if any
/// migration statement fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, PulseError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(map_sqlx)?;

    migrations::run_migrations(&pool).await.map_err(map_sqlx)?;

    Ok(pool)
}
