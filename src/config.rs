use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::models::{Province, UserProfile};
use crate::pipeline::portal::DEFAULT_ENTRY_URL;
use crate::retry::RetryPolicy;
use crate::transport::{TransportKind, TransportSettings};

pub const DEFAULT_PROVINCES: &[&str] = &["Almería", "Cádiz", "Albacete"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub profile: UserProfile,
    pub provinces: Vec<Province>,
    pub transport: TransportConfig,
    pub retry: RetryConfig,
    pub scheduler: SchedulerConfig,
    pub booking: BookingConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub entry_url: String,
    /// Base for root-relative form actions. Defaults to the origin of `entry_url`.
    #[serde(default)]
    pub origin: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub chrome_path: Option<String>,
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_unit_ms: u64,
    pub max_backoff_units: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub check_interval_secs: u64,
    pub province_pause_secs: u64,
    pub error_backoff_secs: u64,
    pub status_every_cycles: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    pub auto_book: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub telegram: TelegramSettings,
    pub email: EmailSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to_address: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl AppConfig {
    /// Layered load: built-in defaults, `config/default`, `config/{RUN_MODE}`,
    /// the explicit file when given, then `CITA__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("CITA")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("provinces"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    fn defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("portal.entry_url", DEFAULT_ENTRY_URL)?
            .set_default(
                "portal.user_agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
            )?
            .set_default("profile.passport_number", "")?
            .set_default("profile.full_name", "")?
            .set_default("profile.birth_year", "")?
            .set_default("profile.nationality", "")?
            .set_default("profile.email", "")?
            .set_default("profile.phone", "")?
            .set_default("provinces", DEFAULT_PROVINCES.to_vec())?
            .set_default("transport.kind", "browser")?
            .set_default("transport.request_timeout_secs", 60)?
            .set_default("transport.connect_timeout_secs", 30)?
            .set_default("transport.element_timeout_secs", 30)?
            .set_default("transport.headless", true)?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.delay_unit_ms", 1000)?
            .set_default("retry.max_backoff_units", 6)?
            .set_default("scheduler.check_interval_secs", 300)?
            .set_default("scheduler.province_pause_secs", 2)?
            .set_default("scheduler.error_backoff_secs", 60)?
            .set_default("scheduler.status_every_cycles", 12)?
            .set_default("booking.auto_book", true)?
            .set_default("notifications.telegram.enabled", true)?
            .set_default("notifications.telegram.api_base", "https://api.telegram.org")?
            .set_default("notifications.email.enabled", false)?
            .set_default("notifications.email.smtp_port", 587)?
            .set_default("notifications.email.from_name", "Cita Watcher")?
            .set_default("notifications.email.use_tls", true)?
            .set_default("logging.directory", "logs")?
            .set_default("logging.file_prefix", "cita-watcher.log")?
            .set_default("logging.level", "cita_watcher=info")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen", "127.0.0.1:9001")
    }

    /// Fill gaps from the variables older deployments used.
    fn apply_legacy_env(&mut self) {
        let telegram = &mut self.notifications.telegram;
        if telegram.bot_token.is_none() {
            telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").ok();
        }
        if telegram.chat_id.is_none() {
            telegram.chat_id = env::var("TELEGRAM_CHAT_ID").ok();
        }
        if self.transport.chrome_path.is_none() {
            self.transport.chrome_path = env::var("CHROME_PATH").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provinces.is_empty() {
            return Err(ConfigError::Message("At least one province must be configured".into()));
        }

        if self.provinces.iter().any(|p| p.as_str().trim().is_empty()) {
            return Err(ConfigError::Message("Province names cannot be empty".into()));
        }

        match Url::parse(&self.portal.entry_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::Message("Invalid portal entry_url".into())),
        }

        if self.origin_url().is_err() {
            return Err(ConfigError::Message("Invalid portal origin".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("Retry max_attempts must be greater than 0".into()));
        }

        if self.scheduler.check_interval_secs == 0 {
            return Err(ConfigError::Message("Scheduler check_interval_secs must be greater than 0".into()));
        }

        if let Err(e) = self.profile.check() {
            return Err(ConfigError::Message(format!("Invalid profile: {}", e)));
        }

        let telegram = &self.notifications.telegram;
        if telegram.enabled && (is_blank(&telegram.bot_token) || is_blank(&telegram.chat_id)) {
            return Err(ConfigError::Message(
                "Telegram notifications need bot_token and chat_id (or TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)".into(),
            ));
        }

        let email = &self.notifications.email;
        if email.enabled && (is_blank(&email.smtp_host) || is_blank(&email.from_address) || is_blank(&email.to_address))
        {
            return Err(ConfigError::Message(
                "Email notifications need smtp_host, from_address and to_address".into(),
            ));
        }

        if !telegram.enabled && !email.enabled {
            return Err(ConfigError::Message("At least one notifier must be enabled".into()));
        }

        Ok(())
    }

    pub fn entry_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.portal.entry_url).map_err(|e| ConfigError::Message(format!("Invalid portal entry_url: {}", e)))
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        match &self.portal.origin {
            Some(origin) => match Url::parse(origin) {
                Ok(url) if url.has_host() => Ok(url),
                _ => Err(ConfigError::Message(format!("Invalid portal origin: {}", origin))),
            },
            None => {
                let entry = self.entry_url()?;
                Url::parse(&entry.origin().ascii_serialization())
                    .map_err(|e| ConfigError::Message(format!("Invalid portal origin: {}", e)))
            }
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            user_agent: self.portal.user_agent.clone(),
            request_timeout: Duration::from_secs(self.transport.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            element_timeout: Duration::from_secs(self.transport.element_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts)
            .with_unit(Duration::from_millis(self.retry.delay_unit_ms))
            .with_max_backoff_units(self.retry.max_backoff_units)
    }
}

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Pause between two provinces of the same cycle.
    pub fn province_pause(&self) -> Duration {
        Duration::from_secs(self.province_pause_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}
