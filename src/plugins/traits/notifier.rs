use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{AppointmentResult, Province};
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for implementing notification channels (Telegram, email, etc.)
///
/// A delivery the remote side refused comes back as an unsuccessful
/// [`NotificationResult`]; `Err` is kept for failures to reach it at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &'static str;
    fn plugin_type(&self) -> &'static str;

    /// An appointment was found for `province`.
    async fn notify(&self, province: &Province, result: &AppointmentResult) -> Result<NotificationResult, AppError>;

    async fn send_status(&self, status: &str) -> Result<NotificationResult, AppError>;
    async fn send_error(&self, message: &str) -> Result<NotificationResult, AppError>;

    async fn test_connection(&self) -> Result<bool, AppError>;
}
