//! Security Notifications
//!
//! SMTP delivery for security-relevant mail. The [`Notifier`] trait exists so
//! the engine can fire notifications without caring whether SMTP is
//! configured; deployments without SMTP simply run with no notifier. Sends
//! are fire-and-forget from the caller's perspective.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// What to send, with its kind-specific payload.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Invitation to set up a new administrator account.
    Invitation { invite_url: String },
    /// Password reset code.
    PasswordReset { reset_code: String },
    /// Account locked after repeated failed sign-ins.
    LockoutAlert { unlock_at: DateTime<Utc> },
}

/// Outbound security notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, notification: Notification) -> Result<()>;
}

/// SMTP-backed [`Notifier`].
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: Mailbox,
}

impl SmtpNotifier {
    /// Create a notifier from server configuration.
    ///
    /// Requires SMTP to be fully configured (`config.has_smtp()` must be true).
    pub fn new(config: &Config) -> Result<Self> {
        let host = config.smtp_host.as_ref().context("SMTP_HOST is required")?;
        let username = config
            .smtp_username
            .as_ref()
            .context("SMTP_USERNAME is required")?;
        let password = config
            .smtp_password
            .as_ref()
            .context("SMTP_PASSWORD is required")?;
        let from = config.smtp_from.as_ref().context("SMTP_FROM is required")?;

        let from_address: Mailbox = from
            .parse()
            .context("SMTP_FROM is not a valid email address")?;

        let creds = Credentials::new(username.clone(), password.clone());

        let mailer = match config.smtp_tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("Failed to create SMTP TLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
            // Default: STARTTLS
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to create SMTP STARTTLS transport")?
                .port(config.smtp_port)
                .credentials(creds)
                .build(),
        };

        Ok(Self {
            mailer,
            from_address,
        })
    }

    /// Test the SMTP connection by sending a NOOP command.
    pub async fn test_connection(&self) -> Result<()> {
        let ok = self
            .mailer
            .test_connection()
            .await
            .context("SMTP connection test failed")?;
        if !ok {
            anyhow::bail!("SMTP server did not respond positively to connection test");
        }
        Ok(())
    }
}

fn render(notification: &Notification) -> (&'static str, String) {
    match notification {
        Notification::Invitation { invite_url } => (
            "You have been invited to administer Wayline",
            format!(
                "You have been invited to the Wayline administration console.\n\
                 \n\
                 Follow this link to set up your account:\n\
                 {invite_url}\n\
                 \n\
                 If you were not expecting this invitation, ignore this email.\n"
            ),
        ),
        Notification::PasswordReset { reset_code } => (
            "Wayline password reset",
            format!(
                "A password reset was requested for your administrator account.\n\
                 \n\
                 Your reset code: {reset_code}\n\
                 \n\
                 Enter this code on the password reset page to set a new password.\n\
                 This code expires in 1 hour.\n\
                 \n\
                 If you did not request this, you can safely ignore this email.\n"
            ),
        ),
        Notification::LockoutAlert { unlock_at } => (
            "Wayline account locked",
            format!(
                "Your Wayline administrator account has been temporarily locked\n\
                 after repeated failed sign-in attempts.\n\
                 \n\
                 Sign-in will be available again at: {}\n\
                 \n\
                 If this was not you, contact your platform administrator and\n\
                 consider rotating your password once the lock expires.\n",
                unlock_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ),
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, recipient: &str, notification: Notification) -> Result<()> {
        let to_mailbox: Mailbox = recipient
            .parse()
            .context("Invalid recipient email address")?;

        let (subject, body) = render(&notification);

        let email = Message::builder()
            .from(self.from_address.clone())
            .to(to_mailbox)
            .subject(subject)
            .body(body)
            .context("Failed to build email message")?;

        self.mailer
            .send(email)
            .await
            .context("Failed to send email via SMTP")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_payload() {
        let (subject, body) = render(&Notification::PasswordReset {
            reset_code: "R3S3T".into(),
        });
        assert!(subject.contains("password reset"));
        assert!(body.contains("R3S3T"));

        let (_, body) = render(&Notification::LockoutAlert {
            unlock_at: Utc::now(),
        });
        assert!(body.contains("temporarily locked"));
    }
}
