use std::sync::Arc;

use tracing::Instrument;
use url::Url;

use crate::booking;
use crate::classifier::{self, Availability};
use crate::form::{self, FormSubmission};
use crate::models::{AppointmentResult, Province, UserProfile};
use crate::retry::RetryPolicy;
use crate::transport::{Page, PageSignature, Transport};

use super::context::PipelineContext;
use super::error::{PipelineStep, StepError, StepFailure};
use super::portal::{
    ACCEPT_CAPTIONS, ASYLUM_MARKER, BIRTH_YEAR_FIELD, DOCUMENT_TYPE_FIELD, DOCUMENT_TYPE_LABEL, ENTER_CAPTIONS,
    ENTRY_PAGE, FULL_NAME_FIELD, INFO_PAGE, NATIONALITY_FIELD, PASSPORT_FIELD, POLICE_MARKER, PROVINCE_FIELD,
    PROVINCE_PAGE,
};

/// Walks one province through the portal, from the entry page to the
/// availability page, over whatever transport it was given.
pub struct AppointmentPipeline {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    profile: Arc<UserProfile>,
    entry_url: Url,
    origin: Url,
    auto_book: bool,
}

impl AppointmentPipeline {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, profile: Arc<UserProfile>, entry_url: Url) -> Self {
        let origin = origin_of(&entry_url);
        Self {
            transport,
            retry,
            profile,
            entry_url,
            origin,
            auto_book: true,
        }
    }

    /// Base for root-relative form actions; the entry URL's origin unless set.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_auto_book(mut self, enabled: bool) -> Self {
        self.auto_book = enabled;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run every step for `province` in a fresh transport session.
    ///
    /// Yields one result, or the error of the first step that could not
    /// advance. The session is closed either way.
    pub async fn check_province(&self, province: &Province) -> Result<AppointmentResult, StepError> {
        let span = tracing::info_span!("province_check", province = %province, transport = %self.transport.kind());

        async {
            tracing::info!("Checking appointments for {}", province);
            self.retry
                .execute("open session", || self.transport.begin_check())
                .await
                .map_err(|e| StepError::new(PipelineStep::Start, e))?;

            let mut ctx = PipelineContext::new(province.clone());
            let outcome = self.run(&mut ctx).await;
            self.transport.end_check().await;

            match &outcome {
                Ok(result) if result.available => {
                    tracing::info!("Appointments available in {} ({} dates)", province, result.dates.len())
                }
                Ok(_) => tracing::info!("No appointments in {}", province),
                Err(e) => tracing::warn!("Check for {} aborted: {}", province, e),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Drive `ctx` through every step on an already open session.
    ///
    /// Ends in `Done`, or in `Aborted` with the failing step's error.
    pub async fn run(&self, ctx: &mut PipelineContext) -> Result<AppointmentResult, StepError> {
        let outcome = self.run_steps(ctx).await;
        if outcome.is_err() {
            ctx.step = PipelineStep::Aborted;
        }
        outcome
    }

    async fn run_steps(&self, ctx: &mut PipelineContext) -> Result<AppointmentResult, StepError> {
        self.select_province(ctx).await?;
        self.select_service(ctx).await?;
        self.reach_entry_form(ctx).await?;
        self.submit_user_data(ctx).await?;
        let availability = self.check_availability(ctx);
        Ok(self.conclude(ctx, availability).await)
    }

    /// Pick the province on the entry page and land on the service choice.
    pub async fn select_province(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let step = PipelineStep::ProvinceSelected;
        let entry = self.fetch(step, "fetch entry page", &self.entry_url).await?;
        let entry = self
            .expect(step, &entry, PageSignature::Element(format!(r#"select[name="{}"]"#, PROVINCE_FIELD)))
            .await?;

        let value = form::resolve_label(&entry.content, PROVINCE_FIELD, ctx.province.as_str())
            .map_err(|e| StepError::new(step, e))?;
        let mut submission = prepare_form(step, &self.origin, &entry, Some(PROVINCE_FIELD), ACCEPT_CAPTIONS)?;
        submission.set(PROVINCE_FIELD, &value);

        let landed = self.submit(step, "submit province", &submission).await?;
        let landed = self.expect(step, &landed, PageSignature::url(PROVINCE_PAGE)).await?;
        ctx.record(&submission);
        ctx.advance(step, landed);
        Ok(())
    }

    /// National police procedures, then the asylum request.
    pub async fn select_service(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let step = PipelineStep::ServiceSelected;
        let mut page = ctx.page.clone();

        for (marker, label) in [
            (POLICE_MARKER, "submit police service"),
            (ASYLUM_MARKER, "submit asylum service"),
        ] {
            page = self
                .expect(step, &page, PageSignature::Element(r#"input[type="radio"]"#.to_string()))
                .await?;
            let (name, value) = form::choose_option(&page.content, marker).map_err(|e| StepError::new(step, e))?;
            let mut submission = prepare_form(step, &self.origin, &page, Some(&name), ACCEPT_CAPTIONS)?;
            submission.set(&name, &value);

            page = self.submit(step, label, &submission).await?;
            ctx.record(&submission);
        }

        let info = self.expect(step, &page, PageSignature::url(INFO_PAGE)).await?;
        ctx.advance(step, info);
        Ok(())
    }

    /// Leave the information page through its "Entrar" button.
    pub async fn reach_entry_form(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let step = PipelineStep::EntryFormReached;
        let submission = prepare_form(step, &self.origin, &ctx.page, None, ENTER_CAPTIONS)?;

        let landed = self.submit(step, "enter application", &submission).await?;
        let landed = self.expect(step, &landed, PageSignature::url(ENTRY_PAGE)).await?;
        ctx.record(&submission);
        ctx.advance(step, landed);
        Ok(())
    }

    /// Fill the identity form and wait for whatever page the portal answers with.
    pub async fn submit_user_data(&self, ctx: &mut PipelineContext) -> Result<(), StepError> {
        let step = PipelineStep::UserDataSubmitted;
        let form_page = self
            .expect(step, &ctx.page, PageSignature::Element(format!(r#"[name="{}"]"#, PASSPORT_FIELD)))
            .await?;

        let html = &form_page.content;
        let document_type =
            form::resolve_label(html, DOCUMENT_TYPE_FIELD, DOCUMENT_TYPE_LABEL).map_err(|e| StepError::new(step, e))?;
        let nationality = form::resolve_label(html, NATIONALITY_FIELD, &self.profile.nationality)
            .map_err(|e| StepError::new(step, e))?;

        let mut submission = prepare_form(step, &self.origin, &form_page, Some(PASSPORT_FIELD), ACCEPT_CAPTIONS)?;
        submission
            .set(DOCUMENT_TYPE_FIELD, &document_type)
            .set(PASSPORT_FIELD, &self.profile.passport_number)
            .set(FULL_NAME_FIELD, &self.profile.full_name)
            .set(BIRTH_YEAR_FIELD, &self.profile.birth_year)
            .set(NATIONALITY_FIELD, &nationality);

        let landed = self.submit(step, "submit user data", &submission).await?;
        let settled = self.expect(step, &landed, PageSignature::Settled).await?;
        ctx.record(&submission);
        ctx.advance(step, settled);
        Ok(())
    }

    pub fn check_availability(&self, ctx: &mut PipelineContext) -> Availability {
        let availability = classifier::classify(&ctx.page, self.transport.kind());
        ctx.step = PipelineStep::AvailabilityChecked;
        availability
    }

    async fn conclude(&self, ctx: &mut PipelineContext, availability: Availability) -> AppointmentResult {
        let province = ctx.province.clone();
        let page_url = ctx.page.url.clone();

        let result = match availability {
            Availability::Unavailable => AppointmentResult::unavailable(province, page_url),
            Availability::Available(details) => {
                let booked = self.auto_book
                    && booking::attempt_booking(
                        self.transport.as_ref(),
                        &self.retry,
                        &self.profile,
                        &ctx.page,
                        &self.origin,
                    )
                    .await;
                AppointmentResult::available(province, details.dates, details.office, booked, page_url)
            }
        };

        ctx.step = PipelineStep::Done;
        result
    }

    async fn fetch(&self, step: PipelineStep, label: &str, url: &Url) -> Result<Page, StepError> {
        self.retry
            .execute(label, || self.transport.fetch(url))
            .await
            .map_err(|e| StepError::new(step, e))
    }

    async fn submit(&self, step: PipelineStep, label: &str, submission: &FormSubmission) -> Result<Page, StepError> {
        self.retry
            .execute(label, || self.transport.submit(submission))
            .await
            .map_err(|e| StepError::new(step, e))
    }

    async fn expect(&self, step: PipelineStep, page: &Page, signature: PageSignature) -> Result<Page, StepError> {
        let label = format!("wait for {}", signature);
        self.retry
            .execute(&label, || self.transport.wait_for(page, &signature))
            .await
            .map_err(|e| StepError::new(step, e))
    }
}

/// The form to submit from `page`: the one around `field` (or the first),
/// with the button matching `captions` pressed when it is named.
fn prepare_form(
    step: PipelineStep,
    origin: &Url,
    page: &Page,
    field: Option<&str>,
    captions: &[&str],
) -> Result<FormSubmission, StepError> {
    let location = page
        .location()
        .map_err(|_| StepError::new(step, StepFailure::InvalidAction(page.url.clone())))?;

    let mut submission = match field {
        Some(field) => form::extract_form_around(&page.content, &location, Some(origin), field),
        None => form::extract_form(&page.content, &location, Some(origin)),
    }
    .map_err(|e| StepError::new(step, e))?;

    match form::find_button(&page.content, captions) {
        Some(button) => {
            if let Some(name) = &button.name {
                submission.set(name, &button.value);
            }
        }
        None => tracing::debug!("No {:?} button on {}, submitting without it", captions, page.url),
    }
    Ok(submission)
}

fn origin_of(url: &Url) -> Url {
    Url::parse(&url.origin().ascii_serialization()).unwrap_or_else(|_| url.clone())
}
