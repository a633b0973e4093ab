use std::fmt;
use std::path::PathBuf;

/// Everything that can go wrong during an ingestion pass.
///
/// Only `Configuration` aborts the whole run. Connection, authentication
/// and protocol failures are scoped to one mailbox, parse failures to one
/// message and write failures to one attachment part.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid subject pattern {pattern:?} in rule {rule}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cannot connect to {host}:{port}: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Login rejected for {username}: {message}")]
    Authentication { username: String, message: String },

    #[error("IMAP command failed: {0}")]
    Protocol(#[from] async_imap::error::Error),

    #[error("Cannot parse message: {0}")]
    MessageParse(String),

    #[error("Cannot write attachment {path}: {source}")]
    AttachmentWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Authentication,
    MessageParse,
    AttachmentWrite,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::InvalidPattern { .. } => ErrorKind::Configuration,
            Error::Connection { .. } | Error::Protocol(_) => ErrorKind::Connection,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::MessageParse(_) => ErrorKind::MessageParse,
            Error::AttachmentWrite { .. } => ErrorKind::AttachmentWrite,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<mailparse::MailParseError> for Error {
    fn from(err: mailparse::MailParseError) -> Self {
        Error::MessageParse(err.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::Authentication => "authentication",
            ErrorKind::MessageParse => "message-parse",
            ErrorKind::AttachmentWrite => "attachment-write",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_are_classified_for_triage() {
        let auth = Error::Authentication {
            username: "bot@example.com".to_string(),
            message: "[AUTHENTICATIONFAILED]".to_string(),
        };
        assert_eq!(auth.kind(), ErrorKind::Authentication);
        assert_eq!(auth.kind().to_string(), "authentication");

        let conn = Error::Connection {
            host: "imap.example.com".to_string(),
            port: 993,
            message: "refused".to_string(),
        };
        assert_eq!(conn.kind(), ErrorKind::Connection);
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err: Error = serde_json::from_str::<Vec<u32>>("[1,").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
