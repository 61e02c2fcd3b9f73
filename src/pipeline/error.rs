use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::form::FormError;
use crate::retry::RetryError;
use crate::transport::TransportError;

/// States of one province check, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Start,
    ProvinceSelected,
    ServiceSelected,
    EntryFormReached,
    UserDataSubmitted,
    AvailabilityChecked,
    Done,
    Aborted,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::Start => "start",
            PipelineStep::ProvinceSelected => "province selection",
            PipelineStep::ServiceSelected => "service selection",
            PipelineStep::EntryFormReached => "entry form",
            PipelineStep::UserDataSubmitted => "user data",
            PipelineStep::AvailabilityChecked => "availability check",
            PipelineStep::Done => "done",
            PipelineStep::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error(transparent)]
    Transport(RetryError),

    #[error("option '{label}' not found in field '{field}'")]
    LabelNotFound { field: String, label: String },

    #[error("no choice matching '{0}'")]
    ChoiceNotFound(String),

    #[error("no form found on page")]
    MissingForm,

    #[error("form action '{0}' could not be resolved")]
    InvalidAction(String),

    #[error("expected {expected}, landed on {actual_url}")]
    UnexpectedPage { expected: String, actual_url: String },
}

impl StepFailure {
    /// The network gave out, as opposed to the portal answering with
    /// something the step did not expect.
    pub fn is_transport(&self) -> bool {
        matches!(self, StepFailure::Transport(_))
    }
}

impl From<RetryError> for StepFailure {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Rejected {
                last: TransportError::Unexpected { expected, url },
                ..
            } => StepFailure::UnexpectedPage {
                expected,
                actual_url: url,
            },
            other => StepFailure::Transport(other),
        }
    }
}

impl From<FormError> for StepFailure {
    fn from(err: FormError) -> Self {
        match err {
            FormError::MissingForm => StepFailure::MissingForm,
            FormError::InvalidAction(action) => StepFailure::InvalidAction(action),
            FormError::LabelNotFound { field, label } => StepFailure::LabelNotFound { field, label },
            FormError::ChoiceNotFound(marker) => StepFailure::ChoiceNotFound(marker),
        }
    }
}

/// A step that could not advance. Ends the check for this province and cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} failed: {failure}")]
pub struct StepError {
    pub step: PipelineStep,
    pub failure: StepFailure,
}

impl StepError {
    pub fn new(step: PipelineStep, failure: impl Into<StepFailure>) -> Self {
        Self {
            step,
            failure: failure.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.failure.is_transport()
    }
}
