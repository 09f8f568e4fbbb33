use thiserror::Error;

/// Failure categories for a single delivery attempt (`spec.md` §4.4, §7).
///
/// Every variant retries with backoff up to `WORKER_MAX_ATTEMPTS` before
/// the job fails -- `spec.md` §7 is explicit that HTTP 4xx is "still
/// retried up to max attempts" and that an SSRF rejection "also counts as
/// a failure attempt," so `pulse-delivery-worker::dispatch` does not branch
/// on failure category, only on attempt count.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("blocked by SSRF policy: {0}")]
    SsrfBlocked(String),

    /// An HTTP response outside the 2xx range. `spec.md` §4.4 records this
    /// on the attempt as `http_<status>`; see [`DeliveryError::reason_code`].
    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("integration configuration error: {0}")]
    Configuration(String),

    #[error("payload serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    /// The string recorded on `DeliveryAttempt.error`, matching `spec.md`
    /// §4.4's `http_<status>` convention for HTTP failures and §7's
    /// `url_blocked:<reason>` convention for SSRF rejections (e.g.
    /// `url_blocked:blocked_ip:169.254.169.254`, per the S4 scenario).
    #[must_use]
    pub fn reason_code(&self) -> String {
        match self {
            Self::HttpStatus(status) => format!("http_{status}"),
            Self::SsrfBlocked(reason) => format!("url_blocked:{reason}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_reason_code_matches_spec_convention() {
        assert_eq!(DeliveryError::HttpStatus(404).reason_code(), "http_404");
    }

    #[test]
    fn ssrf_reason_code_matches_s4_scenario_format() {
        let err = DeliveryError::SsrfBlocked("blocked_ip:169.254.169.254".into());
        assert_eq!(err.reason_code(), "url_blocked:blocked_ip:169.254.169.254");
    }
}
