//! Decides whether the final page of a check offers appointments.

use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::LazyLock;

use crate::transport::{Page, TransportKind};
use crate::utils::text::{contains_folded, squash_whitespace};

/// Phrases the portal shows when every slot is taken. Always authoritative.
pub const NO_APPOINTMENT_PHRASES: &[&str] = &[
    "no hay citas disponibles",
    "no hay citas libres",
    "en este momento no hay citas disponibles",
    "no quedan citas libres",
    "todas las citas están ocupadas",
];

/// Loose hints of a slot picker, only trusted on pages that were not rendered.
pub const AVAILABILITY_PHRASES: &[&str] = &[
    "citas disponibles",
    "citas libres",
    "seleccione una fecha",
    "calendario",
    "fecha disponible",
];

static CALENDAR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"table.calendario, .calendar, input[type="radio"][name*="fecha"], input[type="radio"][name*="Fecha"], select[name*="fecha"], select[name*="Fecha"]"#,
    )
    .expect("static selector")
});
static DATE_RADIOS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[type="radio"][name*="fecha"], input[type="radio"][name*="Fecha"]"#)
        .expect("static selector")
});
static DATE_OPTIONS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"select[name*="fecha"] option, select[name*="Fecha"] option"#).expect("static selector")
});
static OFFICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".oficina, .office").expect("static selector"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityDetails {
    pub dates: Vec<String>,
    pub office: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Unavailable,
    Available(AvailabilityDetails),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

/// Classify the page the user-data submission settled on.
///
/// A "no appointments" phrase wins over everything, then calendar markup,
/// then (only for pages fetched without rendering) the positive phrases.
pub fn classify(page: &Page, transport: TransportKind) -> Availability {
    let document = Html::parse_document(&page.content);
    let text = page_text(&document);

    if let Some(phrase) = NO_APPOINTMENT_PHRASES.iter().find(|p| contains_folded(&text, p)) {
        tracing::debug!("Negative phrase found: '{}'", phrase);
        return Availability::Unavailable;
    }

    if document.select(&CALENDAR).next().is_some() {
        return Availability::Available(AvailabilityDetails {
            dates: extract_dates(&document),
            office: extract_office(&document),
        });
    }

    if !transport.renders_pages() {
        if let Some(phrase) = AVAILABILITY_PHRASES.iter().find(|p| contains_folded(&text, p)) {
            tracing::info!("No calendar markup, but page mentions '{}'", phrase);
            return Availability::Available(AvailabilityDetails {
                dates: Vec::new(),
                office: extract_office(&document),
            });
        }
    }

    Availability::Unavailable
}

fn page_text(document: &Html) -> String {
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Date radios first, date select options otherwise, in document order.
fn extract_dates(document: &Html) -> Vec<String> {
    let radios: Vec<String> = document
        .select(&DATE_RADIOS)
        .filter_map(|r| r.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if !radios.is_empty() {
        return radios;
    }

    document
        .select(&DATE_OPTIONS)
        .filter_map(|o| o.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn extract_office(document: &Html) -> Option<String> {
    document
        .select(&OFFICE)
        .next()
        .map(|el| squash_whitespace(&el.text().collect::<String>()))
        .filter(|office| !office.is_empty())
}
