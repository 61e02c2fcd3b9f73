//! Best-effort booking of the first offered slot.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::form::{FormSubmission, SubmitButton, extract_form_around, find_button};
use crate::models::UserProfile;
use crate::retry::RetryPolicy;
use crate::transport::{Page, PageSignature, Transport};

pub const CONTINUE_CAPTIONS: &[&str] = &["Siguiente", "Continuar"];
pub const CONFIRM_CAPTIONS: &[&str] = &["Enviar", "Confirmar"];

static DATE_RADIO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[type="radio"][name*="fecha"], input[type="radio"][name*="Fecha"]"#)
        .expect("static selector")
});
static EMAIL_FIELD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name*="email"], input[name*="Email"], input[type="email"]"#).expect("static selector")
});
static PHONE_FIELD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name*="telefono"], input[name*="Telefono"], input[name*="phone"], input[type="tel"]"#)
        .expect("static selector")
});

/// Pick the first slot, then fill and confirm the contact form.
///
/// Returns whether the confirmation was submitted. Every failure along the
/// way is logged and reported as `false`; it never affects availability.
pub async fn attempt_booking(
    transport: &dyn Transport,
    retry: &RetryPolicy,
    profile: &UserProfile,
    page: &Page,
    origin: &Url,
) -> bool {
    let Some(slot_form) = plan_slot_selection(page, origin) else {
        tracing::info!("Auto-booking skipped: no selectable slot or continue button");
        return false;
    };

    let contact_page = match retry
        .execute("submit slot selection", || transport.submit(&slot_form))
        .await
    {
        Ok(submitted) => match transport.wait_for(&submitted, &PageSignature::Settled).await {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!("Auto-booking: slot page did not settle: {}", e);
                return false;
            }
        },
        Err(e) => {
            tracing::warn!("Auto-booking: slot selection failed: {}", e);
            return false;
        }
    };

    let Some(contact_form) = plan_contact_submission(&contact_page, origin, profile) else {
        tracing::info!("Auto-booking stopped: contact form not recognised at {}", contact_page.url);
        return false;
    };

    match retry
        .execute("submit contact details", || transport.submit(&contact_form))
        .await
    {
        Ok(confirmation) => {
            tracing::info!("Auto-booking submitted, portal answered from {}", confirmation.url);
            true
        }
        Err(e) => {
            tracing::warn!("Auto-booking: confirmation failed: {}", e);
            false
        }
    }
}

/// Form that selects the first date radio and presses the continue button.
pub fn plan_slot_selection(page: &Page, origin: &Url) -> Option<FormSubmission> {
    let (name, value) = {
        let document = Html::parse_document(&page.content);
        let radio = document.select(&DATE_RADIO).next()?;
        let name = radio.value().attr("name")?.to_string();
        let value = radio.value().attr("value")?.to_string();
        (name, value)
    };
    let button = find_button(&page.content, CONTINUE_CAPTIONS)?;
    let location = page.location().ok()?;

    let mut form = extract_form_around(&page.content, &location, Some(origin), &name).ok()?;
    form.set(&name, &value);
    press(&mut form, &button);
    Some(form)
}

/// Contact form with e-mail and phone filled, confirm button pressed.
pub fn plan_contact_submission(page: &Page, origin: &Url, profile: &UserProfile) -> Option<FormSubmission> {
    let (email_field, phone_field) = {
        let document = Html::parse_document(&page.content);
        let email = document.select(&EMAIL_FIELD).find_map(|e| e.value().attr("name"))?.to_string();
        let phone = document.select(&PHONE_FIELD).find_map(|e| e.value().attr("name"))?.to_string();
        (email, phone)
    };
    let button = find_button(&page.content, CONFIRM_CAPTIONS)?;
    let location = page.location().ok()?;

    let mut form = extract_form_around(&page.content, &location, Some(origin), &email_field).ok()?;
    form.set(&email_field, &profile.email).set(&phone_field, &profile.phone);
    press(&mut form, &button);
    Some(form)
}

fn press(form: &mut FormSubmission, button: &SubmitButton) {
    if let Some(name) = &button.name {
        form.set(name, &button.value);
    }
}
