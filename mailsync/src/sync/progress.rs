//! # Sync progress
//!
//! Module dedicated to the live monitoring of a synchronization. The
//! [`SyncProgress`] handle is cheap to clone and can be read from any
//! thread while the synchronization is running.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use once_cell::sync::OnceCell;

use crate::{copy::CopyCounters, delete::DeleteCounters, index::FolderIndex};

#[derive(Debug, Default)]
struct ProgressState {
    started_at: OnceCell<Instant>,
    finished_at: OnceCell<Instant>,
    target_index: OnceCell<Arc<FolderIndex>>,
    copy: OnceCell<Arc<CopyCounters>>,
    delete: OnceCell<Arc<DeleteCounters>>,
}

/// The synchronization progress.
///
/// Each phase plugs its counters in when it starts. Until then, its
/// counters read as zero.
#[derive(Clone, Debug, Default)]
pub struct SyncProgress(Arc<ProgressState>);

impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start(&self) {
        let _ = self.0.started_at.set(Instant::now());
    }

    pub(crate) fn finish(&self) {
        let _ = self.0.finished_at.set(Instant::now());
    }

    pub(crate) fn set_target_index(&self, index: Arc<FolderIndex>) {
        let _ = self.0.target_index.set(index);
    }

    pub(crate) fn set_copy_counters(&self, counters: Arc<CopyCounters>) {
        let _ = self.0.copy.set(counters);
    }

    pub(crate) fn set_delete_counters(&self, counters: Arc<DeleteCounters>) {
        let _ = self.0.delete.set(counters);
    }

    pub fn target_index(&self) -> Option<&Arc<FolderIndex>> {
        self.0.target_index.get()
    }

    pub fn copy_counters(&self) -> Option<&Arc<CopyCounters>> {
        self.0.copy.get()
    }

    pub fn delete_counters(&self) -> Option<&Arc<DeleteCounters>> {
        self.0.delete.get()
    }

    pub fn is_finished(&self) -> bool {
        self.0.finished_at.get().is_some()
    }

    /// Time spent since the synchronization started, frozen once it
    /// finished.
    pub fn elapsed(&self) -> Duration {
        match (self.0.started_at.get(), self.0.finished_at.get()) {
            (Some(start), Some(end)) => end.saturating_duration_since(*start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Messages processed by the copy (copied and skipped) per
    /// elapsed second.
    pub fn speed(&self) -> f64 {
        let processed = self
            .copy_counters()
            .map(|c| c.messages_copied() + c.messages_skipped())
            .unwrap_or_default();

        speed(processed, self.elapsed().as_secs())
    }
}

/// Renders the one-line monitor.
impl fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (indexed, indexed_skipped) = self
            .target_index()
            .map(|i| (i.indexed_count(), i.skipped_count()))
            .unwrap_or_default();

        let (copied, copied_skipped) = self
            .copy_counters()
            .map(|c| (c.messages_copied(), c.messages_skipped()))
            .unwrap_or_default();

        let (deleted, deleted_skipped) = self
            .delete_counters()
            .map(|c| (c.messages_deleted(), c.messages_skipped()))
            .unwrap_or_default();

        write!(
            f,
            "Indexed (target): {indexed}/{}  Copied: {copied}/{}  Deleted: {deleted}/{}  Speed: {} m/s",
            indexed + indexed_skipped,
            copied + copied_skipped,
            deleted + deleted_skipped,
            format_speed(self.speed()),
        )
    }
}

pub(crate) fn speed(processed: u64, elapsed_secs: u64) -> f64 {
    if elapsed_secs == 0 {
        0.0
    } else {
        processed as f64 / elapsed_secs as f64
    }
}

/// Format a speed with at most two decimals, without trailing zeros.
pub(crate) fn format_speed(speed: f64) -> String {
    let speed = format!("{speed:.2}");
    speed.trim_end_matches('0').trim_end_matches('.').to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{format_speed, speed, SyncProgress};
    use crate::{copy::CopyCounters, index::FolderIndex};

    #[test]
    fn speed_formatting() {
        assert_eq!(format_speed(speed(337, 253)), "1.33");
        assert_eq!(format_speed(speed(337, 2520)), "0.13");
        assert_eq!(format_speed(speed(3, 2)), "1.5");
        assert_eq!(format_speed(speed(10, 0)), "0");
    }

    #[test]
    fn empty_progress() {
        let progress = SyncProgress::new();

        assert!(!progress.is_finished());
        assert_eq!(progress.elapsed().as_secs(), 0);
        assert_eq!(
            progress.to_string(),
            "Indexed (target): 0/0  Copied: 0/0  Deleted: 0/0  Speed: 0 m/s"
        );
    }

    #[test]
    fn progress_reads_plugged_counters() {
        let progress = SyncProgress::new();

        let index = Arc::new(FolderIndex::new());
        index.record_skipped(1337);
        progress.set_target_index(index);
        progress.set_copy_counters(Arc::new(CopyCounters::default()));

        assert!(progress.copy_counters().is_some());
        assert!(progress.delete_counters().is_none());
        assert_eq!(
            progress.to_string(),
            "Indexed (target): 0/1337  Copied: 0/0  Deleted: 0/0  Speed: 0 m/s"
        );
    }
}
