use std::fs;

use log::warn;

use crate::settings::Config;

/// Sends log records to stderr and to the configured log file. stdout
/// carries the JSON result and is never logged to. If the file cannot be
/// opened, logging continues on stderr alone.
pub fn init_logger(config: &Config) -> Result<(), fern::InitError> {
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {} {{{}:{}}} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.file().unwrap_or_else(|| record.target()),
                record.line().unwrap_or(0),
                message
            ))
        })
        .level(config.log_level)
        .level_for("async_imap", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    let log_file = config
        .log_file
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fern::log_file(&config.log_file));

    match log_file {
        Ok(file) => dispatch.chain(file).apply()?,
        Err(e) => {
            dispatch.apply()?;
            warn!("Cannot open log file {}: {}", config.log_file.display(), e);
        }
    }
    Ok(())
}
