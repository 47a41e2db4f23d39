//! Outbound email abstraction.
//!
//! Delivery itself belongs to the external email collaborator; the auth core
//! only decides what to send. `LogEmailSender` is the local-dev default: it
//! logs the payload and reports success.

use anyhow::Result;
use serde_json::json;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery boundary.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Password-reset mail carrying the one-time link.
#[must_use]
pub fn reset_message(frontend_base_url: &str, to_email: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "password_reset".to_string(),
        payload_json: json!({ "reset_url": reset_url(frontend_base_url, token) }).to_string(),
    }
}

/// Invitation mail: same link shape, different template, so the invitee can
/// set a first password.
#[must_use]
pub fn invite_message(frontend_base_url: &str, to_email: &str, token: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "invitation".to_string(),
        payload_json: json!({ "reset_url": reset_url(frontend_base_url, token) }).to_string(),
    }
}

fn reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_trims_trailing_slash() {
        let message = reset_message("https://parkwise.app/", "a@b.co", "tok");
        assert!(message
            .payload_json
            .contains("https://parkwise.app/reset-password#token=tok"));
        assert_eq!(message.template, "password_reset");
    }

    #[test]
    fn log_sender_always_succeeds() {
        let message = invite_message("https://parkwise.app", "a@b.co", "tok");
        assert!(LogEmailSender.send(&message).is_ok());
    }
}
