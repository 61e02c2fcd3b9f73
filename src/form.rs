use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::utils::text::{contains_folded, fold, squash_whitespace};

static FORM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").expect("static selector"));
static FIELDS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input, select, textarea").expect("static selector"));
static OPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").expect("static selector"));
static SELECT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("select").expect("static selector"));
static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").expect("static selector"));
static RADIO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="radio"]"#).expect("static selector"));
static BUTTONS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[type="submit"], button"#).expect("static selector")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("no form found on page")]
    MissingForm,

    #[error("form action '{0}' could not be resolved")]
    InvalidAction(String),

    #[error("option '{label}' not found in field '{field}'")]
    LabelNotFound { field: String, label: String },

    #[error("no choice matching '{0}'")]
    ChoiceNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormMethod {
    Get,
    Post,
}

/// Ordered field-name → value pairs, the way a browser would encode them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the first value of `name`, or append it when absent.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((name.to_string(), value.to_string())),
        }
    }

    /// Add another value for `name`, keeping any earlier ones.
    pub fn append(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, other: &FormFields) {
        for (name, value) in other.pairs() {
            self.set(name, value);
        }
    }
}

/// Everything needed to replay a form post against the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub action: Url,
    pub method: FormMethod,
    pub fields: FormFields,
}

impl FormSubmission {
    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        self.fields.set(name, value);
        self
    }
}

/// A submit control found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitButton {
    pub name: Option<String>,
    pub value: String,
}

/// Extract the first form on the page.
///
/// Root-relative actions resolve against `origin` when one is given,
/// everything else against `page_url`.
pub fn extract_form(html: &str, page_url: &Url, origin: Option<&Url>) -> Result<FormSubmission, FormError> {
    let document = Html::parse_document(html);
    let form = document.select(&FORM).next().ok_or(FormError::MissingForm)?;
    read_form(form, page_url, origin)
}

/// Extract the form holding a control named `field`, falling back to the
/// first form when no form contains it.
pub fn extract_form_around(
    html: &str,
    page_url: &Url,
    origin: Option<&Url>,
    field: &str,
) -> Result<FormSubmission, FormError> {
    let document = Html::parse_document(html);
    let form = document
        .select(&FORM)
        .find(|form| form.select(&FIELDS).any(|el| el.value().attr("name") == Some(field)))
        .or_else(|| document.select(&FORM).next())
        .ok_or(FormError::MissingForm)?;
    read_form(form, page_url, origin)
}

fn resolve_action(raw: &str, page_url: &Url, origin: Option<&Url>) -> Result<Url, FormError> {
    let base = match origin {
        Some(origin) if raw.starts_with('/') && !raw.starts_with("//") => origin,
        _ => page_url,
    };
    base.join(raw).map_err(|_| FormError::InvalidAction(raw.to_string()))
}

fn read_form(form: ElementRef<'_>, page_url: &Url, origin: Option<&Url>) -> Result<FormSubmission, FormError> {
    let raw_action = form.value().attr("action").unwrap_or("").trim();
    let action = resolve_action(raw_action, page_url, origin)?;

    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("get") => FormMethod::Get,
        _ => FormMethod::Post,
    };

    let mut fields = FormFields::new();
    for element in form.select(&FIELDS) {
        let Some(name) = element.value().attr("name") else {
            continue;
        };
        if let Some(value) = field_value(element) {
            fields.append(name, &value);
        }
    }

    Ok(FormSubmission { action, method, fields })
}

/// Value a control contributes to a submission, `None` when it contributes nothing.
fn field_value(element: ElementRef<'_>) -> Option<String> {
    let el = element.value();
    match el.name() {
        "input" => {
            let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "submit" | "button" | "reset" | "image" | "file" => None,
                "radio" | "checkbox" => el
                    .attr("checked")
                    .map(|_| el.attr("value").unwrap_or("on").to_string()),
                _ => Some(el.attr("value").unwrap_or("").to_string()),
            }
        }
        "select" => {
            let options: Vec<ElementRef> = element.select(&OPTION).collect();
            let chosen = options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.first());
            Some(chosen.map(|o| option_value(*o)).unwrap_or_default())
        }
        "textarea" => Some(element.text().collect()),
        _ => None,
    }
}

fn option_value(option: ElementRef<'_>) -> String {
    match option.value().attr("value") {
        Some(value) => value.to_string(),
        None => squash_whitespace(&option.text().collect::<String>()),
    }
}

/// Resolve a visible label to the value the server expects for `field`.
///
/// A `<select name=field>` is searched for an option whose trimmed text equals
/// the label; when the field is a radio group instead, the radio whose label
/// text equals it is used.
pub fn resolve_label(html: &str, field: &str, label: &str) -> Result<String, FormError> {
    let document = Html::parse_document(html);
    let wanted = label.trim();

    for select in document.select(&SELECT).filter(|s| s.value().attr("name") == Some(field)) {
        for option in select.select(&OPTION) {
            if option.text().collect::<String>().trim() == wanted {
                return Ok(option_value(option));
            }
        }
    }

    let wanted = fold(wanted);
    for radio in document.select(&RADIO).filter(|r| r.value().attr("name") == Some(field)) {
        if fold(&choice_label(&document, radio)) == wanted {
            return Ok(radio.value().attr("value").unwrap_or("on").to_string());
        }
    }

    Err(FormError::LabelNotFound {
        field: field.to_string(),
        label: label.to_string(),
    })
}

/// Find the first radio whose label text or value contains `marker`.
/// Returns the radio's `(name, value)`.
pub fn choose_option(html: &str, marker: &str) -> Result<(String, String), FormError> {
    let document = Html::parse_document(html);
    document
        .select(&RADIO)
        .find_map(|radio| {
            let name = radio.value().attr("name")?;
            let value = radio.value().attr("value").unwrap_or("on");
            let text = format!("{} {}", choice_label(&document, radio), value);
            contains_folded(&text, marker).then(|| (name.to_string(), value.to_string()))
        })
        .ok_or_else(|| FormError::ChoiceNotFound(marker.to_string()))
}

/// Find a submit control whose caption contains any of `captions`.
pub fn find_button(html: &str, captions: &[&str]) -> Option<SubmitButton> {
    let document = Html::parse_document(html);
    document.select(&BUTTONS).find_map(|button| {
        let el = button.value();
        if el.name() == "button" {
            let kind = el.attr("type").unwrap_or("submit");
            if !kind.eq_ignore_ascii_case("submit") {
                return None;
            }
        }
        let caption = match el.name() {
            "button" => squash_whitespace(&button.text().collect::<String>()),
            _ => el.attr("value").unwrap_or("").to_string(),
        };
        captions
            .iter()
            .any(|c| contains_folded(&caption, c))
            .then(|| SubmitButton {
                name: el.attr("name").map(str::to_string),
                value: el.attr("value").map(str::to_string).unwrap_or(caption),
            })
    })
}

/// Text a user would read next to a radio: its `<label for>`, a wrapping
/// `<label>`, or the text that follows it up to the next control.
fn choice_label(document: &Html, radio: ElementRef<'_>) -> String {
    if let Some(id) = radio.value().attr("id") {
        if let Some(label) = document.select(&LABEL).find(|l| l.value().attr("for") == Some(id)) {
            return squash_whitespace(&label.text().collect::<String>());
        }
    }

    if let Some(label) = radio
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "label")
    {
        return squash_whitespace(&label.text().collect::<String>());
    }

    let mut text = String::new();
    for sibling in radio.next_siblings() {
        match sibling.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if matches!(e.name(), "input" | "br" | "select") => break,
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(sibling) {
                    text.extend(el.text());
                }
            }
            _ => {}
        }
    }
    squash_whitespace(&text)
}
