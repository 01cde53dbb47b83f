//! CertLedger Commit Log
//!
//! Canonical encoding, hash-chained, append-only commit records.
//! The log is the source of truth for key history; world state is a
//! projection of it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod encoding;
pub mod file;
pub mod log;
pub mod record;

pub use cursor::{HistoryCursor, KeyModification};
pub use encoding::{CanonicalEncode, EncodeError, FrameError, FrameReader, encode_frame};
pub use file::LogFile;
pub use log::CommitLog;
pub use record::{CommitRecord, Write};
