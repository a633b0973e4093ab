use std::io::{self, Write};

use crate::mail_reader::message::CanonicalMessage;
use log::{debug, error};

/// Logs each surfaced message as pretty JSON at debug level.
pub fn display_messages(messages: &[CanonicalMessage]) {
    messages
        .iter()
        .for_each(|message| {
            match serde_json::to_string_pretty(message) {
                Ok(json) => debug!("{}", json),
                Err(e) => error!("Error converting to JSON: {}", e),
            }
        });
}

/// Writes the whole result set as one JSON array followed by a newline.
pub fn write_messages<W: Write>(mut out: W, messages: &[CanonicalMessage]) -> io::Result<()> {
    serde_json::to_writer(&mut out, messages)?;
    writeln!(out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group_rules::group_settings::RecordId;
    use crate::mail_reader::attachments::AttachmentRecord;

    #[test]
    fn test_write_messages_field_names() {
        let message = CanonicalMessage {
            date: "2021-09-20T10:10:10.000000Z".to_string(),
            subject: "Test Subject".to_string(),
            to: "to@example.com".to_string(),
            from_name: None,
            from_email: "john@example.com".to_string(),
            attachments: vec![AttachmentRecord {
                filename: "receipt.pdf".to_string(),
                file_type: "application/pdf".to_string(),
                size: 8,
            }],
            group_settings_ids: vec![RecordId::Number(1), RecordId::Text("2".to_string())],
            message_id: Some(7),
        };

        let mut out = Vec::new();
        write_messages(&mut out, &[message]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(
            value,
            serde_json::json!([{
                "date": "2021-09-20T10:10:10.000000Z",
                "subject": "Test Subject",
                "to": "to@example.com",
                "fromName": null,
                "fromEmail": "john@example.com",
                "attachments": [{"filename": "receipt.pdf", "fileType": "application/pdf", "size": 8}],
                "groupSettingsIds": [1, "2"],
                "messageId": 7
            }])
        );
    }

    #[test]
    fn test_write_empty_result() {
        let mut out = Vec::new();
        write_messages(&mut out, &[]).unwrap();
        assert_eq!(out, b"[]\n");
    }
}
