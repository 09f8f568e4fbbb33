//! Email delivery via SMTP (`spec.md` §4.4). Grounded on
//! `acteon-email::provider::EmailProvider` and `acteon-email::config::EmailConfig`:
//! the same `lettre::AsyncSmtpTransport<Tokio1Executor>` construction
//! (STARTTLS relay when `tls`, `builder_dangerous` otherwise), generalized
//! to build a fresh transport per send -- each tenant integration names its
//! own SMTP host, so there is no single long-lived provider to cache one on
//! -- and to run the SSRF host guard first.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pulse_core::config::Mode;
use tracing::instrument;

use crate::error::DeliveryError;
use crate::ssrf;

pub struct EmailTarget<'a> {
    pub smtp_host: &'a str,
    pub smtp_port: u16,
    pub tls: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub from_address: &'a str,
    pub to_address: &'a str,
}

#[instrument(skip_all, fields(smtp_host = target.smtp_host, to = target.to_address))]
pub async fn send(target: EmailTarget<'_>, mode: Mode, subject: &str, body: &str) -> Result<(), DeliveryError> {
    ssrf::check_host(target.smtp_host, mode).await?;

    let message = build_message(&target, subject, body)?;
    let transport = build_transport(&target)?;

    transport
        .send(message)
        .await
        .map_err(|e| map_smtp_error(&e))?;
    Ok(())
}

fn build_message(target: &EmailTarget<'_>, subject: &str, body: &str) -> Result<Message, DeliveryError> {
    let from: Mailbox = target
        .from_address
        .parse()
        .map_err(|e| DeliveryError::Configuration(format!("invalid from address: {e}")))?;
    let to: Mailbox = target
        .to_address
        .parse()
        .map_err(|e| DeliveryError::Configuration(format!("invalid to address: {e}")))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body.to_owned())
        .map_err(|e| DeliveryError::Configuration(format!("failed to build message: {e}")))
}

fn build_transport(target: &EmailTarget<'_>) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
    let builder = if target.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(target.smtp_host)
            .map_err(|e| DeliveryError::Configuration(format!("SMTP TLS relay error: {e}")))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(target.smtp_host)
    };

    let builder = builder.port(target.smtp_port);

    let builder = if let (Some(user), Some(pass)) = (target.username, target.password) {
        builder.credentials(Credentials::new(user.to_owned(), pass.to_owned()))
    } else {
        builder
    };

    Ok(builder.build())
}

fn map_smtp_error(error: &lettre::transport::smtp::Error) -> DeliveryError {
    let message = error.to_string();
    if error.is_transient() {
        DeliveryError::Connection(format!("transient SMTP error: {message}"))
    } else if error.is_permanent() {
        DeliveryError::Configuration(format!("permanent SMTP error: {message}"))
    } else {
        DeliveryError::Connection(format!("SMTP error: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(to: &str) -> EmailTarget<'static> {
        EmailTarget {
            smtp_host: "localhost",
            smtp_port: 2525,
            tls: false,
            username: None,
            password: None,
            from_address: "alerts@pulse.example",
            to_address: Box::leak(to.to_owned().into_boxed_str()),
        }
    }

    #[test]
    fn builds_message_with_valid_addresses() {
        let t = target("oncall@example.com");
        assert!(build_message(&t, "alert", "device is down").is_ok());
    }

    #[test]
    fn rejects_invalid_to_address() {
        let t = target("not-an-email");
        let err = build_message(&t, "alert", "body").unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[test]
    fn rejects_invalid_from_address() {
        let mut t = target("oncall@example.com");
        t.from_address = "not-valid";
        let err = build_message(&t, "alert", "body").unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[test]
    fn build_transport_without_tls_or_credentials() {
        let t = target("oncall@example.com");
        assert!(build_transport(&t).is_ok());
    }

    #[test]
    fn build_transport_with_credentials() {
        let mut t = target("oncall@example.com");
        t.username = Some("user");
        t.password = Some("pass");
        assert!(build_transport(&t).is_ok());
    }
}
