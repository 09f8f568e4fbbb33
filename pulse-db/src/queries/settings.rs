//! `app_settings` -- the one piece of runtime configuration that is
//! polled from the store rather than the process environment
//! (`spec.md` §4.1, SPEC_FULL.md §10.3).

use std::collections::HashMap;

use sqlx::{PgPool, Row};

/// Fetch every `(key, value)` pair as raw strings; callers parse.
pub async fn load_all(pool: &PgPool) -> sqlx::Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT key, value FROM app_settings")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| (r.get("key"), r.get("value")))
        .collect())
}

/// Write or replace one setting, used by an operator-facing surface
/// outside this core (kept here because the table lives in this crate).
pub async fn set(pool: &PgPool, key: &str, value: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO app_settings (key, value) VALUES ($1, $2)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
