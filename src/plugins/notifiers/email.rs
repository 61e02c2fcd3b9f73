use async_trait::async_trait;
use chrono::Local;
use lettre::message::{Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use super::message;
use crate::config::EmailSettings;
use crate::models::{AppointmentResult, Province, UserProfile};
use crate::plugins::traits::{NotificationResult, NotifierPlugin};
use crate::utils::error::AppError;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    profile: Arc<UserProfile>,
    portal_url: String,
}

impl EmailNotifier {
    pub fn new(settings: &EmailSettings, profile: Arc<UserProfile>, portal_url: &str) -> Result<Self, AppError> {
        let host = required(&settings.smtp_host, "smtp_host")?;
        let from_address = required(&settings.from_address, "from_address")?;
        let to_address = required(&settings.to_address, "to_address")?;

        let from: Mailbox = format!("{} <{}>", settings.from_name, from_address)
            .parse()
            .map_err(|e| AppError::notifier("email", format!("invalid from_address: {}", e)))?;
        let to: Mailbox = to_address
            .parse()
            .map_err(|e| AppError::notifier("email", format!("invalid to_address: {}", e)))?;

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::notifier("email", e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(settings.smtp_port);

        let mailer = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => builder
                .credentials(Credentials::new(username.clone(), password.clone()))
                .build(),
            _ => builder.build(),
        };

        Ok(Self {
            mailer,
            from,
            to,
            profile,
            portal_url: portal_url.to_string(),
        })
    }

    fn compose(&self, subject: &str, body: &str) -> Result<Message, AppError> {
        let text_body = message::to_plain_text(body);
        let html_body = format!(
            "<!DOCTYPE html>\n<html>\n<body style=\"font-family: Arial, sans-serif;\">\n{}\n</body>\n</html>\n",
            body.replace('\n', "<br>\n")
        );

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::notifier("email", e.to_string()))
    }

    async fn deliver(&self, subject: &str, body: &str) -> Result<NotificationResult, AppError> {
        let email = self.compose(subject, body)?;
        match self.mailer.send(email).await {
            Ok(_response) => Ok(NotificationResult::delivered(Some(format!(
                "email-{}",
                chrono::Utc::now().timestamp()
            )))),
            Err(e) => {
                tracing::error!("Failed to send email: {}", e);
                Ok(NotificationResult::failed(e.to_string()))
            }
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::notifier("email", format!("{} is not configured", field)))
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &'static str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, province: &Province, result: &AppointmentResult) -> Result<NotificationResult, AppError> {
        let subject = format!("Asylum appointment available in {}", province);
        let body = message::appointment_message(province, result, &self.profile, &self.portal_url);
        self.deliver(&subject, &body).await
    }

    async fn send_status(&self, status: &str) -> Result<NotificationResult, AppError> {
        self.deliver("Cita Watcher status", &message::status_message(status, Local::now()))
            .await
    }

    async fn send_error(&self, error: &str) -> Result<NotificationResult, AppError> {
        self.deliver("Cita Watcher error", &message::error_message(error, Local::now()))
            .await
    }

    async fn test_connection(&self) -> Result<bool, AppError> {
        self.mailer
            .test_connection()
            .await
            .map_err(|e| AppError::notifier("email", e.to_string()))
    }
}
