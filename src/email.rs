use crate::config::GuardConfig;
use crate::errors::OtpError;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), OtpError>;
}

pub const OTP_SUBJECT: &str = "Your security code";

/// Plain-text body for a verification code mail.
pub fn otp_body(code: &str, expiry_seconds: u64) -> String {
    let minutes = (expiry_seconds / 60).max(1);
    format!(
        "Your verification code is: {}\n\n\
         This code expires in {} minutes.\n\n\
         Never share this code with anyone. If you did not request it, you can ignore this email.",
        code, minutes
    )
}

pub struct LettreEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl LettreEmailSender {
    pub fn new(config: &GuardConfig) -> Result<Self, OtpError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        // Port 1025 is the local catcher (Mailpit/MailHog): plain SMTP, no auth.
        let mailer = if config.smtp_port == 1025 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
                .port(config.smtp_port)
                .build()
        } else if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
                .map_err(|e| OtpError::ConfigError(format!("Invalid SMTP host: {}", e)))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_server)
                .map_err(|e| OtpError::ConfigError(format!("Invalid SMTP host: {}", e)))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_email: config.mail_from.clone(),
            from_name: config.mail_from_name.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for LettreEmailSender {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), OtpError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| OtpError::DeliveryFailed(format!("Invalid from address: {}", e)))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| OtpError::DeliveryFailed(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| OtpError::DeliveryFailed(format!("Failed to build email: {}", e)))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| OtpError::DeliveryFailed(format!("Failed to send email: {}", e)))?;
        Ok(())
    }
}

/// Development stand-in that writes the message to the log instead of
/// sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmailSender;

#[async_trait]
impl EmailSender for TracingEmailSender {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), OtpError> {
        info!(recipient, subject, body, "development mode: email not sent");
        Ok(())
    }
}
