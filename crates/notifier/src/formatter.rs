//! Notification formatter: renders bus payloads into admin-facing messages.
//!
//! Output is Telegram HTML. Every payload value is escaped before it is
//! interpolated, and any missing, null or blank field renders as [`FALLBACK`]
//! so upstream data gaps never block a notification.

use relay_common::types::ChannelKind;
use reqwest::Url;
use serde_json::Value;

/// Marker rendered in place of an absent field.
pub const FALLBACK: &str = "N/A";

const WHATSAPP_BASE: &str = "https://wa.me/";

/// Render the notification text for an event of the given kind.
pub fn format_notification(kind: ChannelKind, payload: &Value) -> String {
    match kind {
        ChannelKind::Registration => format_registration(payload),
        ChannelKind::Application => format_application(payload),
    }
}

fn format_registration(payload: &Value) -> String {
    let name = field(payload, "name");
    let phone = field(payload, "phone");

    let mut text = String::from("<b>🆕 Новый пользователь зарегистрирован!</b>\n\n");
    push_line(&mut text, "Имя", name.as_deref());
    push_line(&mut text, "Фамилия", field(payload, "surname").as_deref());
    push_line(&mut text, "Телефон", phone.as_deref());
    push_line(&mut text, "Email", field(payload, "email").as_deref());
    push_contact_link(&mut text, phone.as_deref(), name.as_deref());

    text
}

fn format_application(payload: &Value) -> String {
    let name = field(payload, "name");
    let phone = field(payload, "phone");

    let mut text = String::from("<b>📝 Новая заявка на займ!</b>\n\n");
    push_line(&mut text, "Номер заявки", field(payload, "application_id").as_deref());
    push_line(&mut text, "Имя", name.as_deref());
    push_line(&mut text, "Телефон", phone.as_deref());
    push_line(&mut text, "Сумма", field(payload, "amount").as_deref());
    push_line(&mut text, "Срок", field(payload, "term").as_deref());
    push_line(&mut text, "Цель", field(payload, "purpose").as_deref());
    push_contact_link(&mut text, phone.as_deref(), name.as_deref());

    text
}

fn push_line(text: &mut String, label: &str, value: Option<&str>) {
    let value = escape_html(value.unwrap_or(FALLBACK));
    text.push_str(&format!("<b>{}:</b> {}\n", label, value));
}

fn push_contact_link(text: &mut String, phone: Option<&str>, name: Option<&str>) {
    let Some(link) = phone.and_then(|p| whatsapp_link(p, name.unwrap_or(FALLBACK))) else {
        return;
    };
    text.push_str(&format!(
        "\n<a href=\"{}\">💬 Написать в WhatsApp</a>",
        escape_html(&link)
    ));
}

/// Build a WhatsApp deep link with a canned greeting for `name`.
///
/// Returns `None` when the phone number contains no digits at all.
pub fn whatsapp_link(phone: &str, name: &str) -> Option<String> {
    let digits = sanitize_phone(phone);
    if digits.is_empty() {
        return None;
    }

    let greeting = format!("Здравствуйте, {}!", name);
    Url::parse_with_params(&format!("{}{}", WHATSAPP_BASE, digits), &[("text", greeting)])
        .ok()
        .map(String::from)
}

/// Strip every character that is not an ASCII digit.
pub fn sanitize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Extract a field as display text.
///
/// Strings are trimmed and any other JSON type uses its JSON text, so a
/// type mismatch never fails. Missing, null and blank values yield `None`.
fn field(payload: &Value, key: &str) -> Option<String> {
    let value = match payload.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!value.is_empty()).then_some(value)
}
