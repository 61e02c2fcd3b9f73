pub mod manager;
pub mod notifiers;
pub mod traits;

pub use manager::{Delivery, NotifierHub};
pub use traits::{NotificationResult, NotifierPlugin};
