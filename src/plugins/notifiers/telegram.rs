use async_trait::async_trait;
use chrono::Local;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::message;
use crate::config::TelegramSettings;
use crate::models::{AppointmentResult, Province, UserProfile};
use crate::plugins::traits::{NotificationResult, NotifierPlugin};
use crate::utils::error::AppError;

/// Sends messages through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    chat_id: String,
    profile: Arc<UserProfile>,
    portal_url: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings, profile: Arc<UserProfile>, portal_url: &str) -> Result<Self, AppError> {
        let token = settings
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::notifier("telegram", "bot token is not configured"))?;
        let chat_id = settings
            .chat_id
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::notifier("telegram", "chat id is not configured"))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_url: format!("{}/bot{}", settings.api_base.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
            profile,
            portal_url: portal_url.to_string(),
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<NotificationResult, AppError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::notifier("telegram", e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Failed to send Telegram message: {}", status);
            return Ok(NotificationResult::failed(format!("Telegram API responded with {}", status)));
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message_id = body
            .pointer("/result/message_id")
            .and_then(|id| id.as_i64())
            .map(|id| id.to_string());
        tracing::info!("Telegram message sent successfully");
        Ok(NotificationResult::delivered(message_id))
    }
}

#[async_trait]
impl NotifierPlugin for TelegramNotifier {
    fn name(&self) -> &'static str {
        "Telegram Notifier"
    }

    fn plugin_type(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, province: &Province, result: &AppointmentResult) -> Result<NotificationResult, AppError> {
        let text = message::appointment_message(province, result, &self.profile, &self.portal_url);
        self.send_message(&text).await
    }

    async fn send_status(&self, status: &str) -> Result<NotificationResult, AppError> {
        self.send_message(&message::status_message(status, Local::now())).await
    }

    async fn send_error(&self, error: &str) -> Result<NotificationResult, AppError> {
        self.send_message(&message::error_message(error, Local::now())).await
    }

    async fn test_connection(&self) -> Result<bool, AppError> {
        let response = self
            .client
            .get(format!("{}/getMe", self.api_url))
            .send()
            .await
            .map_err(|e| AppError::notifier("telegram", e.without_url().to_string()))?;
        Ok(response.status().is_success())
    }
}
