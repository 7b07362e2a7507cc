//! # Delete
//!
//! Module dedicated to the removal of target folders and messages
//! that no longer exist on the source. The [`StoreDeleter`] relies on
//! the source [`FolderIndex`] filled by a complete copy: it must never
//! run after a copy that recorded exceptions.
//!
//! Folders unknown to the source index are deleted recursively.
//! Messages of the remaining folders are processed in batches: a
//! batch flags as deleted every message whose [`Fingerprint`] is
//! unknown to the source folder. Only the last batch of a folder
//! expunges, once the earlier batches of the same folder are done,
//! since expunging shifts message positions.
//!
//! Deletion is best-effort cleanup: failures are logged and do not
//! stop the other folders or batches.

mod error;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Semaphore;
use tracing::{debug, info, trace, warn};

#[doc(inline)]
pub use self::error::{Error, Result};
use crate::{
    batch::{batches, Batch, DEFAULT_BATCH_SIZE},
    fingerprint::Fingerprint,
    folder::FolderNameTranslator,
    index::FolderIndex,
    store::{FetchProfile, Flag, Folder, Message, OpenMode, Store},
    sync::config::DEFAULT_THREADS,
    thread_pool::{ThreadPool, ThreadPoolBuilder},
};

/// The default bound of the wait for delete tasks to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// The delete counters.
#[derive(Debug, Default)]
pub struct DeleteCounters {
    folders_deleted: AtomicU64,
    folders_skipped: AtomicU64,
    messages_deleted: AtomicU64,
    messages_skipped: AtomicU64,
}

impl DeleteCounters {
    pub fn folders_deleted(&self) -> u64 {
        self.folders_deleted.load(Ordering::Relaxed)
    }

    pub fn folders_skipped(&self) -> u64 {
        self.folders_skipped.load(Ordering::Relaxed)
    }

    pub fn messages_deleted(&self) -> u64 {
        self.messages_deleted.load(Ordering::Relaxed)
    }

    pub fn messages_skipped(&self) -> u64 {
        self.messages_skipped.load(Ordering::Relaxed)
    }
}

struct DeleteContext<T: Store> {
    target: Arc<T>,
    source_index: Arc<FolderIndex>,
    counters: Arc<DeleteCounters>,
}

/// The store deleter.
pub struct StoreDeleter<T: Store> {
    ctx: Arc<DeleteContext<T>>,
    target_index: Arc<FolderIndex>,
    threads: usize,
    batch_size: usize,
    timeout: Duration,
}

impl<T: Store> StoreDeleter<T> {
    pub fn new(target: Arc<T>, source_index: Arc<FolderIndex>, target_index: Arc<FolderIndex>) -> Self {
        let ctx = DeleteContext {
            target,
            source_index,
            counters: Default::default(),
        };

        Self {
            ctx: Arc::new(ctx),
            target_index,
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

    pub fn counters(&self) -> Arc<DeleteCounters> {
        self.ctx.counters.clone()
    }

    /// Delete target folders then target messages that have no
    /// counterpart in the source index.
    ///
    /// Only failures that prevent the deletion from starting or
    /// finishing are returned.
    pub async fn delete(&self) -> Result<()> {
        let root = self
            .ctx
            .target
            .default_folder()
            .await
            .map_err(Error::GetRootFolderError)?;

        self.target_index.set_separator(root.separator());

        let translator = FolderNameTranslator::new(&self.target_index, &self.ctx.source_index);
        let folders = self.delete_folders(&translator, root).await;

        info!(
            deleted = self.ctx.counters.folders_deleted(),
            skipped = self.ctx.counters.folders_skipped(),
            "target folders deleted"
        );

        let pool = ThreadPoolBuilder::new(self.ctx.clone())
            .with_size(self.threads)
            .build();

        self.delete_messages(&pool, folders).await;

        pool.drain(self.timeout)
            .await
            .map_err(Error::DrainPoolError)?;

        info!(
            deleted = self.ctx.counters.messages_deleted(),
            skipped = self.ctx.counters.messages_skipped(),
            "target messages deleted"
        );

        Ok(())
    }

    /// Walk the target folder tree, deleting folders unknown to the
    /// source.
    ///
    /// Returns the target and source names of every remaining
    /// message-bearing folder.
    async fn delete_folders(
        &self,
        translator: &FolderNameTranslator,
        root: T::Folder,
    ) -> Vec<(String, String)> {
        let counters = &self.ctx.counters;
        let mut remaining = Vec::new();
        let mut folders = vec![root];

        while let Some(folder) = folders.pop() {
            let name = folder.full_name().to_owned();
            let kind = folder.kind();

            if !name.is_empty() {
                let source_name = translator.translate(&name);

                if !self.ctx.source_index.contains_folder(&source_name) {
                    match folder.delete(true).await {
                        Ok(deleted) => {
                            debug!(folder = name, deleted, "target folder deleted");
                            counters.folders_deleted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            let err = Error::DeleteFolderError(err, name);
                            warn!("{err}");
                            trace!("{err:?}");
                        }
                    }

                    continue;
                }

                counters.folders_skipped.fetch_add(1, Ordering::Relaxed);

                if kind.holds_messages() {
                    remaining.push((name.clone(), source_name));
                }
            }

            if kind.holds_folders() {
                match folder.list().await {
                    Ok(mut children) => {
                        children.reverse();
                        folders.extend(children);
                    }
                    Err(err) => {
                        let err = Error::ListFoldersError(err, name);
                        warn!("{err}");
                        trace!("{err:?}");
                    }
                }
            }
        }

        remaining
    }

    async fn delete_messages(
        &self,
        pool: &ThreadPool<DeleteContext<T>>,
        folders: Vec<(String, String)>,
    ) {
        for (target_name, source_name) in folders {
            let count = match self.count_messages(&target_name).await {
                Ok(count) => count,
                Err(err) => {
                    warn!("{err}");
                    trace!("{err:?}");
                    continue;
                }
            };

            let batches = batches(count, self.batch_size);
            let earlier = batches.len().saturating_sub(1);
            let done = Arc::new(Semaphore::new(0));

            debug!(folder = target_name, count, batches = batches.len(), "cleaning folder");

            for batch in batches {
                let target_name = target_name.clone();
                let source_name = source_name.clone();
                let done = done.clone();

                pool.execute(move |ctx| {
                    delete_batch(ctx, target_name, source_name, batch, done, earlier)
                });
            }
        }
    }

    async fn count_messages(&self, name: &str) -> Result<usize> {
        let folder = self
            .ctx
            .target
            .folder(name)
            .await
            .map_err(|err| Error::GetFolderError(err, name.to_owned()))?;

        folder
            .message_count()
            .await
            .map_err(|err| Error::CountMessagesError(err, name.to_owned()))
    }
}

#[derive(Debug, Default)]
struct Counts {
    deleted: u64,
    skipped: u64,
}

/// Process one batch of a folder.
///
/// `done` counts the finished batches of the folder: the last batch
/// waits for the `earlier` ones before expunging.
async fn delete_batch<T: Store>(
    ctx: Arc<DeleteContext<T>>,
    target_name: String,
    source_name: String,
    batch: Batch,
    done: Arc<Semaphore>,
    earlier: usize,
) {
    trace!(folder = target_name, %batch, last = batch.last, "cleaning messages");

    let mut counts = Counts::default();
    let wait = batch.last.then_some((done.as_ref(), earlier));

    let res = delete_batch_messages(&ctx, &target_name, &source_name, batch, wait, &mut counts).await;

    if let Err(err) = res {
        warn!("{err}");
        trace!("{err:?}");
    }

    if !batch.last {
        done.add_permits(1);
    }

    let counters = &ctx.counters;
    counters.messages_deleted.fetch_add(counts.deleted, Ordering::Relaxed);
    counters.messages_skipped.fetch_add(counts.skipped, Ordering::Relaxed);
}

async fn delete_batch_messages<T: Store>(
    ctx: &DeleteContext<T>,
    target_name: &str,
    source_name: &str,
    batch: Batch,
    wait: Option<(&Semaphore, usize)>,
    counts: &mut Counts,
) -> Result<()> {
    let mut folder = ctx
        .target
        .folder(target_name)
        .await
        .map_err(|err| Error::GetFolderError(err, target_name.to_owned()))?;

    folder
        .open(OpenMode::ReadWrite)
        .await
        .map_err(|err| Error::OpenFolderError(err, target_name.to_owned()))?;

    let flagged = flag_messages(ctx, &folder, target_name, source_name, batch, counts).await;

    let mut expunge = false;

    if let Some((done, earlier)) = wait {
        let permits = u32::try_from(earlier).unwrap_or(u32::MAX);

        match done.acquire_many(permits).await {
            Ok(_) => expunge = true,
            Err(_) => {
                let err = Error::WaitBatchesError(target_name.to_owned());
                warn!("{err}");
            }
        }
    }

    let closed = folder
        .close(expunge)
        .await
        .map_err(|err| Error::CloseFolderError(err, target_name.to_owned()));

    flagged?;
    closed
}

async fn flag_messages<T: Store>(
    ctx: &DeleteContext<T>,
    folder: &T::Folder,
    target_name: &str,
    source_name: &str,
    batch: Batch,
    counts: &mut Counts,
) -> Result<()> {
    let mut messages = folder
        .messages(batch.start, batch.end)
        .await
        .map_err(|err| {
            Error::GetMessagesError(err, target_name.to_owned(), batch.start, batch.end)
        })?;

    folder
        .fetch(&mut messages, &FetchProfile::fingerprint())
        .await
        .map_err(|err| {
            Error::FetchMessagesError(err, target_name.to_owned(), batch.start, batch.end)
        })?;

    let source_fingerprints = ctx.source_index.folder_messages(source_name);

    for msg in messages.iter_mut() {
        match Fingerprint::from_message(&*msg) {
            Ok(fingerprint) if source_fingerprints.contains(&fingerprint) => {
                counts.skipped += 1;
            }
            Ok(_) => {
                msg.set_flag(Flag::Deleted, true)
                    .await
                    .map_err(|err| Error::FlagMessageError(err, target_name.to_owned()))?;
                counts.deleted += 1;
            }
            Err(err) if err.is_protocol_failure() => {
                return Err(Error::FingerprintError(err, target_name.to_owned()));
            }
            Err(err) => {
                trace!(folder = target_name, "skipping message: {err}");
                counts.skipped += 1;
            }
        }
    }

    Ok(())
}
