// Notifier plugin implementations
pub mod email;
pub mod message;
pub mod telegram;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;
