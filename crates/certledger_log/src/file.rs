//! File sink for the commit log.
//!
//! The file is a sequence of frames, one per commit. Only whole frames
//! count: a torn final frame left by a crash is cut off on open, and a
//! failed append is truncated away before the next one.

use crate::encoding::{FrameError, FrameReader, encode_frame};
use crate::record::CommitRecord;
use certledger_core::{LedgerError, LedgerResult};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only file of framed commit records
pub struct LogFile {
    path: PathBuf,
    file: File,
    /// Length of the whole-frame prefix
    committed: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl LogFile {
    /// Open `path`, returning the sink and every record already in it
    ///
    /// A missing file is created empty.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or holds a malformed frame
    pub fn open(path: &Path) -> LedgerResult<(Self, Vec<CommitRecord>)> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let (records, committed) = read_frames(&file, path)?;

        let len = file.metadata()?.len();
        if committed < len {
            tracing::warn!(
                path = %path.display(),
                kept = committed,
                dropped = len - committed,
                "cutting torn frame off commit log"
            );
            file.set_len(committed)?;
        }

        let sink = Self {
            path: path.to_path_buf(),
            file,
            committed,
            poisoned: false,
        };
        Ok((sink, records))
    }

    /// Append one record and hand it to the OS
    ///
    /// On failure the file is cut back to its last whole frame, so the
    /// record leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails, or if an earlier failed write could
    /// not be rolled back
    pub fn append(&mut self, record: &CommitRecord) -> LedgerResult<()> {
        if self.poisoned {
            return Err(LedgerError::storage(format!(
                "commit log {} needs reopening after a failed append",
                self.path.display()
            )));
        }
        let frame = encode_frame(record).map_err(|e| self.failed(&e.to_string()))?;
        if let Err(e) = self.file.write_all(&frame).and_then(|()| self.file.flush()) {
            self.rollback();
            return Err(self.failed(&e.to_string()));
        }
        self.committed += frame.len() as u64;
        Ok(())
    }

    /// Path of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rollback(&mut self) {
        match self.file.set_len(self.committed) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                len = self.committed,
                "rolled back failed commit log append"
            ),
            Err(e) => {
                self.poisoned = true;
                tracing::error!(path = %self.path.display(), error = %e, "commit log rollback failed");
            }
        }
    }

    fn failed(&self, reason: &str) -> LedgerError {
        LedgerError::storage(format!("append to {} failed: {reason}", self.path.display()))
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("committed", &self.committed)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

// Whole frames of `file` and the byte length they cover. A torn final
// frame ends the read; a malformed one is an error.
fn read_frames(file: &File, path: &Path) -> LedgerResult<(Vec<CommitRecord>, u64)> {
    let mut reader = FrameReader::new(BufReader::new(file));
    let mut records = Vec::new();
    loop {
        match reader.next_frame::<CommitRecord>() {
            Ok(Some(record)) => records.push(record),
            Ok(None) | Err(FrameError::Torn { .. }) => break,
            Err(e) => {
                return Err(LedgerError::storage(format!(
                    "corrupt commit log {}: {e}",
                    path.display()
                )));
            }
        }
    }
    Ok((records, reader.offset()))
}
