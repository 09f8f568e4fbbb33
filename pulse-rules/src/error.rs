use thiserror::Error;

/// Errors raised while evaluating a rule spec against supplied inputs.
///
/// This crate never touches I/O, so every variant describes a malformed
/// input the caller handed in -- never a connectivity or timing failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuleError {
    #[error("rule spec is missing required field: {0}")]
    MissingField(&'static str),

    #[error("window_seconds must be positive, got {0}")]
    InvalidWindow(i64),
}
