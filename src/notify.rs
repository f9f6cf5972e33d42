use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::EmailConfig;

/// Sends fatal-error reports by email. Invoked only from the program
/// shell after a run has already failed; best effort, never part of
/// the sync core.
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn report_error(&self, error_msg: &str) -> Result<()> {
        let mut builder = Message::builder()
            .from(
                self.config
                    .from
                    .parse::<Mailbox>()
                    .context("invalid notification sender address")?,
            )
            .subject(self.config.subject.clone());
        for recipient in &self.config.recipients {
            builder = builder.to(recipient
                .parse::<Mailbox>()
                .with_context(|| format!("invalid notification recipient: {recipient}"))?);
        }
        let message = builder
            .body(error_msg.to_string())
            .context("failed to build notification message")?;

        let transport = self.transport()?;
        transport
            .send(&message)
            .context("failed to send error notification")?;
        Ok(())
    }

    /// Use the system mailer on localhost unless an explicit SMTP relay
    /// is configured.
    fn transport(&self) -> Result<SmtpTransport> {
        let smtp = match &self.config.smtp {
            None => return Ok(SmtpTransport::unencrypted_localhost()),
            Some(smtp) => smtp,
        };

        let mut builder = if smtp.starttls {
            SmtpTransport::starttls_relay(&smtp.host)
                .with_context(|| format!("cannot configure STARTTLS relay {}", smtp.host))?
        } else {
            SmtpTransport::builder_dangerous(&smtp.host)
        };
        builder = builder.port(smtp.port);
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}
