//! Webhook delivery (`spec.md` §4.4). Grounded on
//! `acteon-provider::webhook::WebhookProvider`: same `reqwest::Client` plus
//! header-map shape, generalized to run the SSRF guard before every send
//! and to report the spec's `http_<status>` failure reason via
//! [`crate::error::DeliveryError::reason_code`].

use std::collections::HashMap;
use std::time::Duration;

use pulse_core::config::Mode;
use reqwest::{Client, Url};
use tracing::instrument;

use crate::error::DeliveryError;
use crate::ssrf;

pub struct WebhookSender {
    client: Client,
    mode: Mode,
}

impl WebhookSender {
    #[must_use]
    pub fn new(mode: Mode, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, mode }
    }

    #[instrument(skip(self, headers, payload), fields(url))]
    pub async fn send(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let parsed = Url::parse(url)
            .map_err(|e| DeliveryError::Configuration(format!("invalid webhook url: {e}")))?;
        ssrf::check_url(&parsed, self.mode).await?;

        let mut request = self.client.post(parsed).json(payload);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout(Duration::default())
            } else {
                DeliveryError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::HttpStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unparseable_url() {
        let sender = WebhookSender::new(Mode::Dev, Duration::from_secs(5));
        let err = sender
            .send("not a url", &HashMap::new(), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[tokio::test]
    async fn rejects_loopback_target_in_prod() {
        let sender = WebhookSender::new(Mode::Prod, Duration::from_secs(5));
        let err = sender
            .send(
                "https://127.0.0.1/hook",
                &HashMap::new(),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::SsrfBlocked(_)));
    }

    #[tokio::test]
    async fn rejects_plain_http_in_prod() {
        let sender = WebhookSender::new(Mode::Prod, Duration::from_secs(5));
        let err = sender
            .send(
                "http://example.com/hook",
                &HashMap::new(),
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::SsrfBlocked(_)));
    }
}
