//! Host notification email
//!
//! Events may carry a host email address. When mail is enabled in the
//! configuration, moderation-relevant federation activity (new RSVPs,
//! pending approvals) is mailed to the host. When disabled, notifications
//! are logged and dropped.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;
use crate::error::AppError;

pub struct HostMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
}

impl HostMailer {
    /// Build a mailer from configuration.
    ///
    /// Returns a no-op mailer when mail is disabled.
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                transport: None,
                from_address: String::new(),
            });
        }

        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| AppError::Config("mail.smtp_host is required when mail is enabled".to_string()))?;
        let from_address = config
            .from_address
            .clone()
            .ok_or_else(|| AppError::Config("mail.from_address is required when mail is enabled".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Mail(format!("Invalid SMTP relay: {}", e)))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: Some(builder.build()),
            from_address,
        })
    }

    /// Send a plain-text notification to an event host.
    ///
    /// A `None` recipient means the event has no host email on file and
    /// the notification is silently skipped.
    pub async fn notify_host(
        &self,
        recipient: Option<&str>,
        subject: &str,
        body: String,
    ) -> Result<(), AppError> {
        let Some(recipient) = recipient else {
            return Ok(());
        };

        let Some(transport) = &self.transport else {
            tracing::debug!(recipient, subject, "Mail disabled, dropping host notification");
            return Ok(());
        };

        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| AppError::Mail(format!("Invalid from address: {}", e)))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| AppError::Mail(format!("Invalid recipient address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Mail(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::Mail(format!("SMTP send failed: {}", e)))?;

        tracing::info!(recipient, subject, "Host notification sent");
        Ok(())
    }
}
