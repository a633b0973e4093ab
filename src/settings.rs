use std::path::PathBuf;

use log::LevelFilter;

use crate::error::{Error, Result};

const CONTENT_DIR: &str = "temp";
const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "imap-client.log";

/// Runtime configuration, resolved once at start-up and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_path: PathBuf,
    /// Where extracted attachments are written.
    pub content_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: LevelFilter,
}

impl Config {
    /// An empty `base_path` means the current directory.
    pub fn new(base_path: impl Into<PathBuf>, log_level: &str) -> Result<Self> {
        let base_path = base_path.into();
        let log_level = log_level
            .parse::<LevelFilter>()
            .map_err(|_| Error::Configuration(format!("unknown log level {:?}", log_level)))?;

        Ok(Config {
            content_dir: base_path.join(CONTENT_DIR),
            log_file: base_path.join(LOG_DIR).join(LOG_FILE),
            base_path,
            log_level,
        })
    }
}
