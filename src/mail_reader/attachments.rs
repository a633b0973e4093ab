use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;

use crate::error::{Error, Result};

/// Content types worth handing to the receipt pipeline. Compared as-is,
/// so the check is case sensitive.
pub const ACCEPTED_MIME_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/png",
    "image/heic",
    "image/bmp",
    "image/webp",
    "image/tiff",
    "application/pdf",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRecord {
    pub filename: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
    pub size: u64,
}

pub fn valid_mime_type(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|mime_type| ACCEPTED_MIME_TYPES.contains(&mime_type))
}

/// Directory that extracted attachments are written into. Files are named
/// after the attachment, so a second attachment with the same name
/// replaces the first.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ContentStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `content` under `filename` and returns the size the file
    /// system reports for it afterwards.
    pub fn store(&self, filename: &str, content: &[u8]) -> Result<u64> {
        let path = self.dir.join(filename);
        let write_error = |source| Error::AttachmentWrite {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_error)?;
        fs::write(&path, content).map_err(write_error)?;
        let metadata = fs::metadata(&path).map_err(write_error)?;
        Ok(metadata.len())
    }
}

// Only the last path component of a declared filename is used, so
// "../../etc/x.pdf" lands in the store as "x.pdf".
fn sanitize_filename(filename: &str) -> Option<&str> {
    let name = filename.rsplit(&['/', '\\'][..]).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

fn part_filename(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .and_then(|name| sanitize_filename(name))
        .map(str::to_string)
}

fn has_disposition(part: &ParsedMail) -> bool {
    part.headers
        .get_first_value("Content-Disposition")
        .is_some_and(|value| !value.trim().is_empty())
}

fn process_part(part: &ParsedMail, store: &ContentStore, records: &mut Vec<AttachmentRecord>) {
    let content_type = part.ctype.mimetype.as_str();

    if !content_type.starts_with("multipart/") && has_disposition(part) {
        match part_filename(part) {
            Some(filename) if valid_mime_type(Some(content_type)) => {
                match part.get_body_raw() {
                    Ok(content) => match store.store(&filename, &content) {
                        Ok(size) => {
                            debug!("Stored attachment {} ({}, {} bytes)", filename, content_type, size);
                            records.push(AttachmentRecord {
                                filename,
                                file_type: content_type.to_string(),
                                size,
                            });
                        }
                        Err(e) => warn!("Skipping attachment {}: {}", filename, e),
                    },
                    Err(e) => warn!("Cannot decode attachment {}: {}", filename, e),
                }
            }
            Some(filename) => debug!("Ignoring attachment {} of type {}", filename, content_type),
            None => {}
        }
    }

    for subpart in &part.subparts {
        process_part(subpart, store, records);
    }
}

/// Walks the MIME tree and stores every accepted attachment, returning one
/// record per stored part in traversal order. Parts that cannot be decoded
/// or written are skipped.
pub fn extract(parsed: &ParsedMail, store: &ContentStore) -> Vec<AttachmentRecord> {
    let mut records = Vec::new();
    process_part(parsed, store, &mut records);
    records
}
