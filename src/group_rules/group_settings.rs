use serde::{Deserialize, Deserializer, Serialize};

use std::fmt;
use std::io::Read;
use log::info;
use regex::Regex;

use crate::error::{Error, Result};

/// Identifier of a rule or mailbox as handed over by the service.
/// Database ids arrive as numbers, hand-written configs often use strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

/// Connection details of one mailbox. Two identities are the same mailbox
/// only if every field is equal.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxIdentity {
    pub id: RecordId,
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(rename = "useStartTLS", default)]
    pub use_start_tls: bool,
}

impl fmt::Debug for MailboxIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxIdentity")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("use_start_tls", &self.use_start_tls)
            .finish()
    }
}

// The service persists ports as text, so both `993` and `"993"` show up.
fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port {:?}", text))),
    }
}

#[derive(Debug, Deserialize)]
struct SubjectLineRegex {
    regex: String,
}

#[derive(Debug, Deserialize)]
struct WhiteListEmail {
    email: String,
}

// One element of the stdin array. Unknown fields are ignored and `null`
// lists count as empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    id: RecordId,
    system_email: MailboxIdentity,
    #[serde(default)]
    subject_line_regexes: Option<Vec<SubjectLineRegex>>,
    #[serde(default)]
    email_white_list: Option<Vec<WhiteListEmail>>,
}

/// A subscriber's filter: which mailbox it listens on, which senders it
/// accepts and which subjects it wants. Empty lists accept everything.
#[derive(Debug, Clone)]
pub struct SubscriberRule {
    pub id: RecordId,
    pub mailbox: MailboxIdentity,
    pub sender_whitelist: Vec<String>,
    pub subject_patterns: Vec<Regex>,
}

impl SubscriberRule {
    /// Builds a rule, compiling every subject pattern up front so a bad
    /// pattern fails the load instead of the match.
    pub fn new<I, S>(
        id: RecordId,
        mailbox: MailboxIdentity,
        sender_whitelist: Vec<String>,
        subject_patterns: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subject_patterns = subject_patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                    rule: id.to_string(),
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SubscriberRule {
            id,
            mailbox,
            sender_whitelist,
            subject_patterns,
        })
    }
}

impl TryFrom<GroupSettings> for SubscriberRule {
    type Error = Error;

    fn try_from(settings: GroupSettings) -> Result<Self> {
        let whitelist = settings
            .email_white_list
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.email)
            .collect();
        let patterns = settings
            .subject_line_regexes
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.regex);

        SubscriberRule::new(settings.id, settings.system_email, whitelist, patterns)
    }
}

/// Reads the JSON array of group settings and turns it into rules.
/// A literal `null` is treated as an empty list.
pub fn load_group_settings<R: Read>(reader: R) -> Result<Vec<SubscriberRule>> {
    let settings: Option<Vec<GroupSettings>> = serde_json::from_reader(reader)?;
    let rules = settings
        .unwrap_or_default()
        .into_iter()
        .map(SubscriberRule::try_from)
        .collect::<Result<Vec<_>>>()?;

    info!("Loaded {} group settings", rules.len());
    Ok(rules)
}

/// Reads a single `systemEmail` object, as sent for a connection check.
pub fn load_system_email<R: Read>(reader: R) -> Result<MailboxIdentity> {
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const GROUP_SETTINGS: &str = r#"[
        {
            "id": 1,
            "groupId": 7,
            "systemEmail": {
                "id": "1",
                "host": "imap.gmail.com",
                "port": 993,
                "username": "test@gmail.com",
                "password": "password",
                "useStartTLS": false
            },
            "subjectLineRegexes": [{"regex": ".*test.*"}],
            "emailWhiteList": [{"email": "test@example.com"}]
        },
        {
            "id": "2",
            "systemEmail": {
                "id": 2,
                "host": "mail.example.com",
                "port": "143",
                "username": "bot",
                "password": "secret",
                "useStartTLS": true
            },
            "subjectLineRegexes": null,
            "emailWhiteList": null
        }
    ]"#;

    #[test]
    fn test_load_group_settings() {
        let rules = load_group_settings(GROUP_SETTINGS.as_bytes()).unwrap();
        assert_eq!(rules.len(), 2);

        assert_eq!(rules[0].id, RecordId::Number(1));
        assert_eq!(rules[0].mailbox.id, RecordId::Text("1".to_string()));
        assert_eq!(rules[0].mailbox.port, 993);
        assert_eq!(rules[0].sender_whitelist, vec!["test@example.com"]);
        assert_eq!(rules[0].subject_patterns[0].as_str(), ".*test.*");

        assert_eq!(rules[1].id, RecordId::Text("2".to_string()));
        assert_eq!(rules[1].mailbox.port, 143);
        assert!(rules[1].mailbox.use_start_tls);
        assert!(rules[1].sender_whitelist.is_empty());
        assert!(rules[1].subject_patterns.is_empty());
    }

    #[test]
    fn test_null_and_empty_input() {
        assert!(load_group_settings("null".as_bytes()).unwrap().is_empty());
        assert!(load_group_settings("[]".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_input_is_configuration_error() {
        for input in ["", "{", "[{\"id\": 1}]", "[{\"id\": 1, \"systemEmail\": {\"id\": 1, \"host\": \"h\", \"port\": \"abc\", \"username\": \"u\", \"password\": \"p\"}}]"] {
            let err = load_group_settings(input.as_bytes()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "input {:?}", input);
        }
    }

    #[test]
    fn test_invalid_regex_is_rejected_at_load() {
        let input = r#"[{"id": 3, "systemEmail": {"id": 1, "host": "h", "port": 993,
            "username": "u", "password": "p"}, "subjectLineRegexes": [{"regex": "(unclosed"}]}]"#;
        let err = load_group_settings(input.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref rule, .. } if rule == "3"));
    }

    #[test]
    fn test_debug_hides_password() {
        let identity = load_system_email(
            r#"{"id": 1, "host": "h", "port": 993, "username": "u", "password": "hunter2"}"#.as_bytes(),
        )
        .unwrap();
        assert!(!identity.use_start_tls);
        assert!(!format!("{:?}", identity).contains("hunter2"));
    }
}
