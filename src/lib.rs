pub mod booking;
pub mod classifier;
pub mod config;
pub mod form;
pub mod models;
pub mod pipeline;
pub mod plugins;
pub mod retry;
pub mod scheduler;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use pipeline::AppointmentPipeline;
pub use scheduler::Monitor;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
