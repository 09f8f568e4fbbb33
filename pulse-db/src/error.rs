use pulse_core::PulseError;

/// Convert a `sqlx` error into the shared [`PulseError`] taxonomy.
///
/// Connection/IO-shaped errors become `Transient` (worth a retry by the
/// caller's outer loop); everything else (constraint violations, bad SQL)
/// becomes `Db`, matching the grouping in `pulse_core::error`.
pub fn map_sqlx(err: sqlx::Error) -> PulseError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PulseError::Transient(err.to_string()),
        _ => PulseError::Db(err.to_string()),
    }
}
