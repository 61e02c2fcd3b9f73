use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::notifiers::{EmailNotifier, TelegramNotifier};
use super::traits::{NotificationResult, NotifierPlugin};
use crate::config::AppConfig;
use crate::models::{AppointmentResult, Province, UserProfile};
use crate::utils::error::AppError;

pub type NotifierPluginBox = Arc<dyn NotifierPlugin>;

/// Outcome of one notifier for one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub notifier: String,
    pub result: NotificationResult,
}

/// Ordered registry of the enabled notifiers.
///
/// Every send goes to all of them concurrently. Failures are logged and
/// counted here and reported back as unsuccessful deliveries, never as errors.
#[derive(Clone, Default)]
pub struct NotifierHub {
    notifiers: Arc<RwLock<Vec<NotifierPluginBox>>>,
}

impl NotifierHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the hub from the notifiers enabled in `config`.
    pub async fn from_config(config: &AppConfig, profile: Arc<UserProfile>) -> Result<Self, AppError> {
        let hub = Self::new();
        let portal_url = config.portal.entry_url.as_str();

        if config.notifications.telegram.enabled {
            let telegram = TelegramNotifier::new(&config.notifications.telegram, Arc::clone(&profile), portal_url)?;
            hub.register_notifier(Arc::new(telegram)).await?;
        }
        if config.notifications.email.enabled {
            let email = EmailNotifier::new(&config.notifications.email, Arc::clone(&profile), portal_url)?;
            hub.register_notifier(Arc::new(email)).await?;
        }

        Ok(hub)
    }

    /// Register a notifier plugin
    pub async fn register_notifier(&self, plugin: NotifierPluginBox) -> Result<(), AppError> {
        let mut notifiers = self.notifiers.write().await;
        if notifiers.iter().any(|n| n.plugin_type() == plugin.plugin_type()) {
            return Err(AppError::notifier(
                plugin.plugin_type(),
                "a notifier of this type is already registered",
            ));
        }
        tracing::info!("Registered notifier: {}", plugin.name());
        notifiers.push(plugin);
        Ok(())
    }

    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        let notifiers = self.notifiers.read().await;
        notifiers.iter().any(|n| n.plugin_type() == plugin_type)
    }

    /// Notifier types in registration order
    pub async fn list_notifier_types(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().await;
        notifiers.iter().map(|n| n.plugin_type().to_string()).collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.notifiers.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<NotifierPluginBox> {
        self.notifiers.read().await.clone()
    }

    pub async fn notify_all(&self, province: &Province, result: &AppointmentResult) -> Vec<Delivery> {
        let notifiers = self.snapshot().await;
        let sends = notifiers.iter().map(|n| async move { (n.plugin_type(), n.notify(province, result).await) });
        settle("appointment", join_all(sends).await)
    }

    pub async fn broadcast_status(&self, status: &str) -> Vec<Delivery> {
        let notifiers = self.snapshot().await;
        let sends = notifiers.iter().map(|n| async move { (n.plugin_type(), n.send_status(status).await) });
        settle("status", join_all(sends).await)
    }

    pub async fn broadcast_error(&self, message: &str) -> Vec<Delivery> {
        let notifiers = self.snapshot().await;
        let sends = notifiers.iter().map(|n| async move { (n.plugin_type(), n.send_error(message).await) });
        settle("error", join_all(sends).await)
    }

    /// Check that every notifier can reach its service.
    pub async fn test_all(&self) -> Vec<(String, bool)> {
        let notifiers = self.snapshot().await;
        let checks = notifiers.iter().map(|n| async move {
            let reachable = match n.test_connection().await {
                Ok(reachable) => reachable,
                Err(e) => {
                    tracing::warn!("{} connection test failed: {}", n.name(), e);
                    false
                }
            };
            (n.plugin_type().to_string(), reachable)
        });
        join_all(checks).await
    }
}

fn settle(kind: &str, outcomes: Vec<(&'static str, Result<NotificationResult, AppError>)>) -> Vec<Delivery> {
    outcomes
        .into_iter()
        .map(|(notifier, outcome)| {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => NotificationResult::failed(e.to_string()),
            };
            let label = if result.success { "delivered" } else { "failed" };
            if !result.success {
                tracing::warn!(
                    "{} notification via {} failed: {}",
                    kind,
                    notifier,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            metrics::counter!("cita_notifications_total", "notifier" => notifier, "kind" => kind.to_string(), "outcome" => label)
                .increment(1);
            Delivery {
                notifier: notifier.to_string(),
                result,
            }
        })
        .collect()
}
