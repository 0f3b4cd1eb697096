use chrono::NaiveDateTime;
use shared::domain::ConsultationRecord;
use storage::{AppendOutcome, TIMESTAMP_FORMAT};

use crate::parser::ParseError;

pub const STORE_FAILURE: &str =
    "❌ Error processing your consultation request. Please try again later.";
pub const GENERIC_APOLOGY: &str =
    "❌ An error occurred while processing your request. Please try again.";
pub const ACCESS_DENIED: &str =
    "❌ Access denied. This command is for authorized users only.";
pub const NO_EXPORT_FILE: &str = "📋 No consultations file found.";
pub const EXPORT_FAILURE: &str =
    "❌ Error generating consultations file. Please try again later.";
pub const UNKNOWN_COMMAND: &str = "🤔 Unknown command. Use /help to see what I can do.";

const NOT_PROVIDED: &str = "Not provided";

const FORMAT_EXAMPLE: &str = "Name: Patient Name
Phone: +1234567890
Email: patient@example.com
Age: 30
Consultation Type: General Checkup
Message: Detailed consultation request";

pub fn start_text(sender_name: Option<&str>) -> String {
    let greeting = match sender_name {
        Some(name) => format!("Hi {name}!"),
        None => "Hi!".to_string(),
    };
    format!(
        "{greeting}\n\n🦷 Welcome to the consultation intake bot!\n\n\
         Send your consultation request in the following format:\n\n\
         {FORMAT_EXAMPLE}\n\n\
         Admins can use /get_consultations to download all requests."
    )
}

pub fn help_text() -> String {
    format!(
        "🦷 Consultation Bot Help\n\n\
         Available commands:\n\
         /start - Start the bot and see instructions\n\
         /help - Show this help message\n\
         /get_consultations - Download all consultations (admin only)\n\
         /stats - Show consultation statistics\n\n\
         To request a consultation, send a message like:\n\n\
         {FORMAT_EXAMPLE}\n\n\
         JSON is also supported:\n\n\
         {{\"name\": \"Patient Name\", \"phone\": \"+1234567890\", \
         \"email\": \"patient@example.com\", \"consultation_type\": \"General Checkup\"}}"
    )
}

pub fn format_help(error: &ParseError) -> String {
    let reason = match error {
        ParseError::MissingRequired(fields) => {
            format!("Missing required fields: {}.", fields.join(", "))
        }
        ParseError::InvalidJson(_) => "The JSON could not be read.".to_string(),
        ParseError::NoFields => "No fields were found.".to_string(),
    };
    format!(
        "❌ Unable to parse consultation request. {reason}\n\n\
         Please use this format:\n\n{FORMAT_EXAMPLE}\n\n\
         Use /help to see all supported formats."
    )
}

/// Reply to the person who submitted `record`.
pub fn confirmation(record: &ConsultationRecord) -> String {
    let mut text = String::from("✅ Consultation request received!\n\n");
    text.push_str(&contact_lines(record));
    push_optional(&mut text, "🎂 Age", record.age.as_deref());
    push_optional(&mut text, "🦷 Type", record.consultation_type.as_deref());
    push_optional(&mut text, "💬 Message", record.message.as_deref());
    push_optional(&mut text, "📅 Date", record.date.as_deref());
    text.push_str("\nYour request has been saved and our team will contact you soon!");
    text
}

/// Forward to the admin identity, including every submitted field.
pub fn admin_notification(record: &ConsultationRecord, outcome: &AppendOutcome) -> String {
    let mut text = String::from("🔔 New Consultation Request\n\n");
    text.push_str(&contact_lines(record));
    push_optional(&mut text, "🎂 Age", record.age.as_deref());
    push_optional(&mut text, "🦷 Type", record.consultation_type.as_deref());
    push_optional(&mut text, "💬 Message", record.message.as_deref());
    push_optional(&mut text, "📅 Date", record.date.as_deref());
    for (key, value) in &record.extra {
        push_optional(&mut text, &label_for(key), Some(value));
    }
    if let Some(chat_id) = record.chat_id {
        text.push_str(&format!("📱 Chat ID: {chat_id}\n"));
    }
    text.push_str(&format!(
        "🧾 Row: {}\n⏰ Time: {}",
        outcome.row,
        outcome.timestamp.format(TIMESTAMP_FORMAT)
    ));
    text
}

pub fn stats_text(count: usize, file_name: &str, now: NaiveDateTime) -> String {
    format!(
        "📊 Consultation Statistics\n\n\
         Total consultations: {count}\n\
         File: {file_name}\n\
         Last updated: {}",
        now.format(TIMESTAMP_FORMAT)
    )
}

pub fn export_caption(count: usize, now: NaiveDateTime) -> String {
    format!(
        "📊 Consultations Export\nTotal consultations: {count}\nGenerated: {}",
        now.format(TIMESTAMP_FORMAT)
    )
}

pub fn export_file_name(now: NaiveDateTime) -> String {
    format!("consultations_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn contact_lines(record: &ConsultationRecord) -> String {
    format!(
        "👤 Name: {}\n📞 Phone: {}\n📧 Email: {}\n",
        record.name.as_deref().unwrap_or(NOT_PROVIDED),
        record.phone.as_deref().unwrap_or(NOT_PROVIDED),
        record.email.as_deref().unwrap_or(NOT_PROVIDED),
    )
}

fn push_optional(text: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        text.push_str(&format!("{label}: {value}\n"));
    }
}

fn label_for(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => format!("▫️ {}{}", first.to_uppercase(), chars.as_str()),
        None => "▫️".to_string(),
    }
}
