pub mod appointment;
pub mod profile;

pub use appointment::{AppointmentResult, CycleReport, ProvinceOutcome};
pub use profile::{Province, UserProfile};
