use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::Province;
use crate::pipeline::{PipelineStep, StepError};

/// Outcome of one completed province check. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentResult {
    pub province: Province,
    pub timestamp: DateTime<Utc>,
    pub available: bool,
    pub dates: Vec<String>,
    pub office: Option<String>,
    pub booking_attempted: bool,
    pub page_url: String,
}

impl AppointmentResult {
    pub fn unavailable(province: Province, page_url: impl Into<String>) -> Self {
        Self {
            province,
            timestamp: Utc::now(),
            available: false,
            dates: Vec::new(),
            office: None,
            booking_attempted: false,
            page_url: page_url.into(),
        }
    }

    pub fn available(
        province: Province,
        dates: Vec<String>,
        office: Option<String>,
        booking_attempted: bool,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            province,
            timestamp: Utc::now(),
            available: true,
            dates,
            office,
            booking_attempted,
            page_url: page_url.into(),
        }
    }
}

/// What happened to one province in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvinceOutcome {
    Checked { result: AppointmentResult },
    Aborted { province: Province, step: PipelineStep, error: String },
}

impl ProvinceOutcome {
    pub fn aborted(province: Province, error: &StepError) -> Self {
        ProvinceOutcome::Aborted {
            province,
            step: error.step,
            error: error.to_string(),
        }
    }

    pub fn province(&self) -> &Province {
        match self {
            ProvinceOutcome::Checked { result } => &result.province,
            ProvinceOutcome::Aborted { province, .. } => province,
        }
    }

    pub fn result(&self) -> Option<&AppointmentResult> {
        match self {
            ProvinceOutcome::Checked { result } => Some(result),
            ProvinceOutcome::Aborted { .. } => None,
        }
    }
}

/// Everything one pass over the configured provinces produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ProvinceOutcome>,
    pub transport_failures: usize,
}

impl CycleReport {
    pub fn results(&self) -> impl Iterator<Item = &AppointmentResult> {
        self.outcomes.iter().filter_map(ProvinceOutcome::result)
    }

    pub fn available(&self) -> impl Iterator<Item = &AppointmentResult> {
        self.results().filter(|r| r.available)
    }

    pub fn aborted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result().is_none()).count()
    }

    /// Every province aborted on the network rather than on page content.
    pub fn all_transport_failures(&self) -> bool {
        !self.outcomes.is_empty() && self.transport_failures == self.outcomes.len()
    }
}
