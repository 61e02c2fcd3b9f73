//! Message bodies shared by the notifiers. Written in the small HTML subset
//! Telegram accepts; [`to_plain_text`] strips it for plain channels.

use chrono::{DateTime, Local, TimeZone};

use crate::models::{AppointmentResult, Province, UserProfile};

const MAX_LISTED_DATES: usize = 5;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn appointment_message(
    province: &Province,
    result: &AppointmentResult,
    profile: &UserProfile,
    portal_url: &str,
) -> String {
    let found_at = result.timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT);

    let mut message = String::from("🚨 <b>ASYLUM APPOINTMENT AVAILABLE!</b> 🚨\n\n");
    message.push_str(&format!("📍 <b>Province:</b> {}\n", escape_html(province.as_str())));
    message.push_str(&format!("⏰ <b>Found at:</b> {}\n\n", found_at));

    if !result.dates.is_empty() {
        message.push_str("📅 <b>Available dates:</b>\n");
        for date in result.dates.iter().take(MAX_LISTED_DATES) {
            message.push_str(&format!("   • {}\n", escape_html(date)));
        }
        if result.dates.len() > MAX_LISTED_DATES {
            message.push_str(&format!("   • ... and {} more\n", result.dates.len() - MAX_LISTED_DATES));
        }
        message.push('\n');
    }

    if let Some(office) = &result.office {
        message.push_str(&format!("🏢 <b>Office:</b> {}\n\n", escape_html(office)));
    }

    message.push_str("👤 <b>User Details:</b>\n");
    message.push_str(&format!("   • Name: {}\n", escape_html(&profile.full_name)));
    message.push_str(&format!("   • Passport: {}\n", escape_html(&profile.passport_number)));
    message.push_str(&format!("   • Email: {}\n", escape_html(&profile.email)));
    message.push_str(&format!("   • Phone: {}\n\n", escape_html(&profile.phone)));

    if result.booking_attempted {
        message.push_str("✅ <b>Auto-booking attempted!</b>\n");
    } else {
        message.push_str("⚠️ <b>Manual booking required</b>\n");
    }

    message.push_str(&format!("\n🔗 Visit: {}", portal_url));
    message
}

pub fn status_message<Tz: TimeZone>(status: &str, at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "ℹ️ <b>Cita Watcher Status</b>\n\n⏰ {}\n📊 {}",
        at.format(TIMESTAMP_FORMAT),
        escape_html(status)
    )
}

pub fn error_message<Tz: TimeZone>(error: &str, at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "❌ <b>Cita Watcher Error</b>\n\n⏰ {}\n💬 {}",
        at.format(TIMESTAMP_FORMAT),
        escape_html(error)
    )
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn to_plain_text(message: &str) -> String {
    message
        .replace("<b>", "")
        .replace("</b>", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
