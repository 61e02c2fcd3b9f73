pub mod context;
pub mod error;
pub mod portal;
pub mod runner;

pub use context::PipelineContext;
pub use error::{PipelineStep, StepError, StepFailure};
pub use runner::AppointmentPipeline;
