use crate::form::{FormFields, FormSubmission};
use crate::models::Province;
use crate::transport::Page;

use super::error::PipelineStep;

/// State of one province check. Created at `Start`, owned by the runner and
/// dropped when the check ends; nothing carries over to the next check.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub province: Province,

    // Page the last transport call ended on; blank before the first fetch
    pub page: Page,

    // Every field value submitted so far, latest value wins
    pub fields: FormFields,

    pub step: PipelineStep,
}

impl PipelineContext {
    pub fn new(province: Province) -> Self {
        Self {
            province,
            page: Page::new("", "", 0),
            fields: FormFields::new(),
            step: PipelineStep::Start,
        }
    }

    pub(crate) fn record(&mut self, form: &FormSubmission) {
        self.fields.extend(&form.fields);
    }

    pub(crate) fn advance(&mut self, step: PipelineStep, page: Page) {
        tracing::debug!("{}: {} -> {} ({})", self.province, self.step, step, page.url);
        self.page = page;
        self.step = step;
    }
}
