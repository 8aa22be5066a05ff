//! Append-only on-disk event log, one file per stream.
//!
//! Open/replay on startup, append on write. The row format is the plain
//! event wire framing (`ds_protocol::wire`) rather than a SQL schema, so
//! the on-disk layout is the same format used between nodes and no
//! embedded database is introduced.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ds_protocol::{wire, Event, Syntax};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal contains a malformed frame: {0}")]
    Malformed(String),
}

/// A single append-only log backing one stream's persistence, when the
/// stream opts into it (spec.md §4.E "if persistence enabled").
pub struct EventJournal {
    path: PathBuf,
    file: File,
}

impl EventJournal {
    /// Open (creating if absent) the journal file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event frame using the plain (non-JSON) wire syntax.
    pub fn append(&mut self, event: &Event) -> Result<(), JournalError> {
        let frame = wire::encode(event, Syntax::Opaque);
        self.file.write_all(&frame)?;
        self.file.flush()?;
        Ok(())
    }

    /// Replay every frame currently on disk, in append order. Used to
    /// repopulate a fresh [`crate::ring::RecentEventsRing`] at startup.
    pub fn replay(&self) -> Result<Vec<Event>, JournalError> {
        let mut buf = Vec::new();
        File::open(&self.path)?.read_to_end(&mut buf)?;
        let (events, _consumed) =
            wire::decode_all(&buf).map_err(|e| JournalError::Malformed(e.to_string()))?;
        Ok(events)
    }
}
