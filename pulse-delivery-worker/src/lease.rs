//! Job leasing (`spec.md` §4.4 steps 1-2): requeue stuck jobs, then claim a
//! batch of due `PENDING` jobs with `FOR UPDATE SKIP LOCKED` inside one
//! transaction so the lock is held only until commit.

use sqlx::PgPool;

use pulse_core::domain::DeliveryJob;

/// Requeue jobs stuck in `PROCESSING` past `stuck_minutes`. Run once per
/// leasing cycle ahead of [`claim_batch`].
pub async fn requeue_stuck(pool: &PgPool, stuck_minutes: i64) -> sqlx::Result<u64> {
    pulse_db::queries::jobs::requeue_stuck(pool, stuck_minutes).await
}

/// Claim up to `batch_size` due `PENDING` jobs, flipping them to
/// `PROCESSING` before returning.
pub async fn claim_batch(pool: &PgPool, batch_size: i64) -> sqlx::Result<Vec<DeliveryJob>> {
    let mut tx = pool.begin().await?;
    let jobs = pulse_db::queries::jobs::lease_batch(&mut tx, batch_size).await?;
    tx.commit().await?;
    Ok(jobs)
}
