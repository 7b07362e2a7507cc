//! # Crawl
//!
//! Module dedicated to store indexing. The [`StoreCrawler`] walks the
//! folder tree of a store, registers every folder into a
//! [`FolderIndex`] and submits one task per batch of messages to a
//! [`ThreadPool`]. Each task computes the [`Fingerprint`] of the
//! messages of its batch and records them into the index.
//!
//! A store failure inside a task is recorded as a crawl exception.
//! Tasks poll the index between messages and give up as soon as an
//! exception has been recorded: this is best-effort, a task blocked
//! on a store call finishes that call first. Once the pool is
//! drained, the first recorded exception becomes the error of the
//! whole crawl.

mod error;

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, trace};

#[doc(inline)]
pub use self::error::{Error, Result};
use crate::{
    batch::{batches, Batch, DEFAULT_BATCH_SIZE},
    fingerprint::Fingerprint,
    index::FolderIndex,
    store::{FetchProfile, Folder, OpenMode, Store},
    sync::config::DEFAULT_THREADS,
    thread_pool::{ThreadPool, ThreadPoolBuilder},
};

/// The default bound of the wait for crawl tasks to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// The store crawler.
pub struct StoreCrawler<S: Store> {
    store: Arc<S>,
    index: Arc<FolderIndex>,
    threads: usize,
    batch_size: usize,
    timeout: Duration,
}

impl<S: Store> StoreCrawler<S> {
    pub fn new(store: Arc<S>, index: Arc<FolderIndex>) -> Self {
        Self {
            store,
            index,
            threads: DEFAULT_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &Arc<FolderIndex> {
        &self.index
    }

    /// Index every folder and every message of the store.
    pub async fn crawl(&self) -> Result<()> {
        let root = self
            .store
            .default_folder()
            .await
            .map_err(Error::GetRootFolderError)?;

        self.index.set_separator(root.separator());

        let pool = ThreadPoolBuilder::new(self.store.clone())
            .with_size(self.threads)
            .build();

        let walked = self.walk(&pool, root).await;
        let drained = pool.drain(self.timeout).await;

        walked?;
        drained.map_err(Error::DrainPoolError)?;

        if let Some(err) = self.index.crawl_exceptions().into_iter().next() {
            return Err(Error::CrawlExceptionError(err));
        }

        info!(
            folders = self.index.folders().len(),
            indexed = self.index.indexed_count(),
            skipped = self.index.skipped_count(),
            "store crawled"
        );

        Ok(())
    }

    async fn walk(&self, pool: &ThreadPool<S>, root: S::Folder) -> Result<()> {
        let mut folders = vec![root];

        while let Some(folder) = folders.pop() {
            if self.index.has_crawl_exception() {
                debug!("crawl exception recorded, stop walking folders");
                break;
            }

            let name = folder.full_name().to_owned();
            let kind = folder.kind();

            // the root folder is only an entry point
            if !name.is_empty() {
                self.index.add_folder(&name);

                if kind.holds_messages() {
                    let count = folder
                        .message_count()
                        .await
                        .map_err(|err| Error::CountMessagesError(err, name.clone()))?;

                    let batches = batches(count, self.batch_size);
                    debug!(folder = name, count, batches = batches.len(), "crawling folder");

                    for batch in batches {
                        let index = self.index.clone();
                        let name = name.clone();
                        pool.execute(move |store| crawl_batch(store, index, name, batch));
                    }
                }
            }

            if kind.holds_folders() {
                let mut children = folder
                    .list()
                    .await
                    .map_err(|err| Error::ListFoldersError(err, name.clone()))?;
                children.reverse();
                folders.extend(children);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counts {
    indexed: u64,
    skipped: u64,
}

async fn crawl_batch<S: Store>(
    store: Arc<S>,
    index: Arc<FolderIndex>,
    folder: String,
    batch: Batch,
) {
    trace!(folder, %batch, "crawling messages");

    let mut counts = Counts::default();

    if let Err(err) = index_batch(store.as_ref(), &index, &folder, batch, &mut counts).await {
        debug!("cannot crawl messages {batch} of folder {folder}: {err}");
        trace!("{err:?}");
        index.add_crawl_exception(err);
    }

    index.record_indexed(counts.indexed);
    index.record_skipped(counts.skipped);
}

async fn index_batch<S: Store>(
    store: &S,
    index: &FolderIndex,
    name: &str,
    batch: Batch,
    counts: &mut Counts,
) -> Result<()> {
    let mut folder = store
        .folder(name)
        .await
        .map_err(|err| Error::GetFolderError(err, name.to_owned()))?;

    folder
        .open(OpenMode::ReadOnly)
        .await
        .map_err(|err| Error::OpenFolderError(err, name.to_owned()))?;

    let indexed = index_messages(&folder, index, name, batch, counts).await;

    let closed = folder
        .close(false)
        .await
        .map_err(|err| Error::CloseFolderError(err, name.to_owned()));

    indexed?;
    closed
}

async fn index_messages<F: Folder>(
    folder: &F,
    index: &FolderIndex,
    name: &str,
    batch: Batch,
    counts: &mut Counts,
) -> Result<()> {
    let mut messages = folder
        .messages(batch.start, batch.end)
        .await
        .map_err(|err| Error::GetMessagesError(err, name.to_owned(), batch.start, batch.end))?;

    folder
        .fetch(&mut messages, &FetchProfile::fingerprint())
        .await
        .map_err(|err| Error::FetchMessagesError(err, name.to_owned(), batch.start, batch.end))?;

    let fingerprints = index.folder_messages(name);

    for msg in &messages {
        if index.has_crawl_exception() {
            debug!(folder = name, %batch, "crawl exception recorded, abandoning batch");
            return Ok(());
        }

        match Fingerprint::from_message(msg) {
            Ok(fingerprint) => {
                if fingerprints.insert(fingerprint) {
                    counts.indexed += 1;
                } else {
                    counts.skipped += 1;
                }
            }
            Err(err) if err.is_protocol_failure() => {
                return Err(Error::FingerprintError(err, name.to_owned()));
            }
            Err(err) => {
                trace!(folder = name, "skipping message: {err}");
                counts.skipped += 1;
            }
        }
    }

    Ok(())
}
