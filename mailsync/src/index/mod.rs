//! # Folder index
//!
//! Module dedicated to the per-store catalog built during a run. A
//! [`FolderIndex`] holds the hierarchy delimiter and the INBOX name of
//! a store, the full names of its folders, the [`Fingerprint`]s of the
//! messages of each folder, and the crawl progress.
//!
//! The index is shared by every worker of a phase: all its methods
//! take `&self` and can be called concurrently without any external
//! lock.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::{crawl, fingerprint::Fingerprint, folder::INBOX};

/// The concurrent set of fingerprints of a folder.
#[derive(Debug, Default)]
pub struct FingerprintSet(Mutex<HashSet<Fingerprint>>);

impl FingerprintSet {
    fn lock(&self) -> MutexGuard<'_, HashSet<Fingerprint>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add the given fingerprint. Returns `false` if it was already
    /// present.
    pub fn insert(&self, fingerprint: Fingerprint) -> bool {
        self.lock().insert(fingerprint)
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().remove(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// The folder index.
#[derive(Debug, Default)]
pub struct FolderIndex {
    /// The hierarchy delimiter of the store.
    separator: OnceCell<String>,

    /// The first folder name matching INBOX, case-insensitively.
    inbox: OnceCell<String>,

    /// The full names of the registered folders.
    folders: RwLock<HashSet<String>>,

    /// The fingerprints of the messages of each folder.
    messages: Mutex<HashMap<String, Arc<FingerprintSet>>>,

    indexed: AtomicU64,
    skipped: AtomicU64,

    crawl_failed: AtomicBool,
    crawl_errors: Mutex<Vec<Arc<crawl::Error>>>,
}

impl FolderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the hierarchy delimiter of the store.
    ///
    /// Only the first call has an effect.
    pub fn set_separator(&self, separator: impl ToString) {
        let separator = separator.to_string();
        if self.separator.set(separator.clone()).is_ok() {
            debug!(separator, "recorded folder separator");
        }
    }

    pub fn separator(&self) -> Option<&str> {
        self.separator.get().map(String::as_str)
    }

    pub fn inbox(&self) -> Option<&str> {
        self.inbox.get().map(String::as_str)
    }

    /// Register the given folder full name. Returns `false` if it was
    /// already registered.
    ///
    /// The first name matching INBOX case-insensitively becomes the
    /// INBOX name of the index, for its whole lifetime.
    pub fn add_folder(&self, name: impl ToString) -> bool {
        let name = name.to_string();

        if name.eq_ignore_ascii_case(INBOX) && self.inbox.set(name.clone()).is_ok() {
            debug!(inbox = name, "recorded inbox name");
        }

        self.folders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name)
    }

    pub fn contains_folder(&self, name: &str) -> bool {
        self.folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Get a snapshot of the registered folder full names.
    pub fn folders(&self) -> HashSet<String> {
        self.folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the fingerprint set of the given folder.
    ///
    /// The set is created on first access; every caller asking for the
    /// same folder gets the same set.
    pub fn folder_messages(&self, name: &str) -> Arc<FingerprintSet> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    pub fn record_indexed(&self, n: u64) {
        self.indexed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn indexed_count(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Cheap check polled by crawl workers between messages.
    pub fn has_crawl_exception(&self) -> bool {
        self.crawl_failed.load(Ordering::Acquire)
    }

    pub fn add_crawl_exception(&self, err: crawl::Error) {
        self.crawl_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(err));
        self.crawl_failed.store(true, Ordering::Release);
    }

    /// Get a snapshot of the recorded crawl exceptions, in recording
    /// order.
    pub fn crawl_exceptions(&self) -> Vec<Arc<crawl::Error>> {
        self.crawl_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
