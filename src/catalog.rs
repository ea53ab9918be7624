//! Startup catalog ingestion.
//!
//! The catalog file is line-oriented: repeated pairs of
//! `description\nticket_count\n`. The pair index becomes the event id.
//! Any malformed entry is fatal at startup; the wire encodes the
//! description length in a single byte, so a catalog this module
//! accepts is always servable.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Wire limit on a description: the length field is 8-bit.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// One catalog entry as read from disk, before the store owns it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSeed {
    pub description: Vec<u8>,
    pub ticket_count: u16,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("event {event_id}: description is empty")]
    EmptyDescription { event_id: u32 },
    #[error("event {event_id}: description is {len} bytes, wire limit is {MAX_DESCRIPTION_LEN}")]
    DescriptionTooLong { event_id: u32, len: usize },
    #[error("event {event_id}: missing ticket count line")]
    MissingCount { event_id: u32 },
    #[error("event {event_id}: invalid ticket count {raw:?}")]
    InvalidCount { event_id: u32, raw: String },
}

pub fn load(path: &Path) -> Result<Vec<EventSeed>, CatalogError> {
    let contents = fs::read(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&contents)
}

pub fn parse(contents: &[u8]) -> Result<Vec<EventSeed>, CatalogError> {
    let mut lines: Vec<&[u8]> = contents.split(|&byte| byte == b'\n').collect();
    // A trailing newline yields one empty trailing slice; it is not a line.
    if lines.last() == Some(&&b""[..]) {
        lines.pop();
    }

    if lines.len() % 2 != 0 {
        return Err(CatalogError::MissingCount {
            event_id: (lines.len() / 2) as u32,
        });
    }

    let mut seeds = Vec::with_capacity(lines.len() / 2);
    for (event_id, pair) in lines.chunks_exact(2).enumerate() {
        let event_id = event_id as u32;
        let description = pair[0];
        if description.is_empty() {
            return Err(CatalogError::EmptyDescription { event_id });
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(CatalogError::DescriptionTooLong {
                event_id,
                len: description.len(),
            });
        }

        let ticket_count = std::str::from_utf8(pair[1])
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok())
            .ok_or_else(|| CatalogError::InvalidCount {
                event_id,
                raw: String::from_utf8_lossy(pair[1]).into_owned(),
            })?;

        seeds.push(EventSeed {
            description: description.to_vec(),
            ticket_count,
        });
    }

    Ok(seeds)
}
