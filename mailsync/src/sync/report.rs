//! # Sync report
//!
//! Module dedicated to the synchronization report.

use std::{fmt, sync::Arc, time::Duration};

use super::progress::{format_speed, speed};
use crate::{copy, delete::DeleteCounters, index::FolderIndex};

/// The synchronization report.
///
/// A report is a snapshot of the counters of every phase, taken once
/// the synchronization finished.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// The report of the target crawl.
    pub crawl: CrawlReport,

    /// The report of the copy.
    pub copy: CopyReport,

    /// The report of the deletion, if it ran.
    pub delete: Option<DeleteReport>,

    /// The duration of the whole synchronization.
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn has_copy_exception(&self) -> bool {
        !self.copy.exceptions.is_empty()
    }

    /// Messages processed by the copy per elapsed second.
    pub fn speed(&self) -> f64 {
        speed(
            self.copy.messages_copied + self.copy.messages_skipped,
            self.elapsed.as_secs(),
        )
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let copy = &self.copy;
        let delete = self.delete.clone().unwrap_or_default();

        writeln!(
            f,
            "  Folders copied:   {}/{}",
            copy.folders_copied,
            copy.folders_copied + copy.folders_skipped
        )?;
        writeln!(
            f,
            "  Messages copied:  {}/{}",
            copy.messages_copied,
            copy.messages_copied + copy.messages_skipped
        )?;
        writeln!(f, "  Speed:            {} messages/second", format_speed(self.speed()))?;
        writeln!(f, "  Exceptions:       {}", self.has_copy_exception())?;
        writeln!(f)?;
        writeln!(
            f,
            "  Folders deleted:  {}/{}",
            delete.folders_deleted,
            delete.folders_deleted + delete.folders_skipped
        )?;
        writeln!(
            f,
            "  Messages deleted: {}/{}",
            delete.messages_deleted,
            delete.messages_deleted + delete.messages_skipped
        )?;
        writeln!(f)?;
        writeln!(f, "  Elapsed time:     {} seconds", self.elapsed.as_secs())
    }
}

/// The report of the target crawl.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CrawlReport {
    pub folders: usize,
    pub messages_indexed: u64,
    pub messages_skipped: u64,
}

impl From<&FolderIndex> for CrawlReport {
    fn from(index: &FolderIndex) -> Self {
        Self {
            folders: index.folders().len(),
            messages_indexed: index.indexed_count(),
            messages_skipped: index.skipped_count(),
        }
    }
}

/// The report of the copy.
#[derive(Debug, Default)]
pub struct CopyReport {
    pub folders_copied: u64,
    pub folders_skipped: u64,
    pub messages_copied: u64,
    pub messages_skipped: u64,

    /// The copy exceptions, in recording order.
    pub exceptions: Vec<Arc<copy::Error>>,
}

impl CopyReport {
    pub fn new(counters: &copy::CopyCounters, exceptions: Vec<Arc<copy::Error>>) -> Self {
        Self {
            folders_copied: counters.folders_copied(),
            folders_skipped: counters.folders_skipped(),
            messages_copied: counters.messages_copied(),
            messages_skipped: counters.messages_skipped(),
            exceptions,
        }
    }
}

/// The report of the deletion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeleteReport {
    pub folders_deleted: u64,
    pub folders_skipped: u64,
    pub messages_deleted: u64,
    pub messages_skipped: u64,
}

impl From<&DeleteCounters> for DeleteReport {
    fn from(counters: &DeleteCounters) -> Self {
        Self {
            folders_deleted: counters.folders_deleted(),
            folders_skipped: counters.folders_skipped(),
            messages_deleted: counters.messages_deleted(),
            messages_skipped: counters.messages_skipped(),
        }
    }
}
