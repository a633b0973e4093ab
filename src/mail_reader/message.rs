use chrono::{DateTime, Utc};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::group_rules::group_settings::RecordId;
use crate::mail_reader::attachments::AttachmentRecord;

const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// A message exactly as the server handed it over, with its
/// session-scoped sequence number.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: u32,
    pub body: Vec<u8>,
}

/// Metadata emitted for a surfaced message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMessage {
    pub date: String,
    pub subject: String,
    pub to: String,
    pub from_name: Option<String>,
    pub from_email: String,
    pub attachments: Vec<AttachmentRecord>,
    pub group_settings_ids: Vec<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u32>,
}

pub fn parse(raw: &[u8]) -> Result<ParsedMail<'_>> {
    Ok(parse_mail(raw)?)
}

/// Splits `"Display Name" <address>` on the first `<`.
///
/// The name keeps whatever whitespace preceded the bracket. Without a
/// bracket the whole value is the address and there is no name.
pub fn split_address(value: &str) -> (Option<String>, String) {
    match value.split_once('<') {
        Some((name, rest)) => {
            let address = rest.split('>').next().unwrap_or_default().replace('<', "");
            (Some(name.to_string()), address.trim().to_string())
        }
        None => (None, value.trim().to_string()),
    }
}

fn required_header(parsed: &ParsedMail, header: &str) -> Result<String> {
    parsed
        .headers
        .get_first_value(header)
        .ok_or_else(|| Error::MessageParse(format!("missing {} header", header)))
}

fn usable_address(header: &str, value: &str) -> Result<(Option<String>, String)> {
    let (name, address) = split_address(value);
    if address.is_empty() {
        return Err(Error::MessageParse(format!("no address in {} header {:?}", header, value)));
    }
    Ok((name, address))
}

// "Wed, 06 Jan 2021 12:34:56 +0000 (UTC)" -> "Wed, 06 Jan 2021 12:34:56 +0000"
fn strip_zone_comment(date: &str) -> &str {
    let date = date.trim();
    match date.rfind('(') {
        Some(open) if date.ends_with(')') => date[..open].trim_end(),
        _ => date,
    }
}

/// Converts an RFC 2822 date into `YYYY-MM-DDTHH:MM:SS.ffffffZ` in UTC.
pub fn format_date(date: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc2822(strip_zone_comment(date))
        .map_err(|e| Error::MessageParse(format!("invalid date {:?}: {}", date, e)))?;
    Ok(parsed.with_timezone(&Utc).format(OUTPUT_DATE_FORMAT).to_string())
}

/// Pulls the canonical header fields out of a parsed message. Attachments
/// and rule ids are filled in later.
pub fn normalize(parsed: &ParsedMail) -> Result<CanonicalMessage> {
    let (from_name, from_email) = usable_address("From", &required_header(parsed, "From")?)?;
    // To is emitted as the header reads; it only has to contain an address.
    let to = required_header(parsed, "To")?;
    usable_address("To", &to)?;

    let date = required_header(parsed, "Date")?;
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();

    Ok(CanonicalMessage {
        date: format_date(&date)?,
        subject,
        to,
        from_name,
        from_email,
        attachments: Vec::new(),
        group_settings_ids: Vec::new(),
        message_id: None,
    })
}
