//! # Copy
//!
//! Module dedicated to the replication of a source store onto a
//! target store. The [`StoreCopier`] works in two phases:
//!
//! 1. the source folder tree is walked, each folder is translated to
//!    the target naming and created on the target when the target
//!    index does not know it yet;
//!
//! 2. each message-bearing folder is split into batches, one copy
//!    task per batch is submitted to a [`ThreadPool`]. A task appends
//!    to the target the messages whose [`Fingerprint`] is unknown to
//!    the target folder.
//!
//! Store failures do not stop the copy: they are collected as copy
//! exceptions, and [`StoreCopier::has_copy_exception`] tells whether
//! the copy is complete.

mod error;

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tracing::{debug, info, trace};

#[doc(inline)]
pub use self::error::{Error, Result};
use crate::{
    batch::{batches, Batch, DEFAULT_BATCH_SIZE},
    fingerprint::Fingerprint,
    folder::FolderNameTranslator,
    index::{FingerprintSet, FolderIndex},
    store::{FetchProfile, Folder, FolderType, Message, OpenMode, Store},
    sync::config::DEFAULT_THREADS,
    thread_pool::{ThreadPool, ThreadPoolBuilder},
};

/// The default bound of the wait for copy tasks to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// The copy counters.
///
/// Counters only grow and can be read while the copy is running.
#[derive(Debug, Default)]
pub struct CopyCounters {
    folders_copied: AtomicU64,
    folders_skipped: AtomicU64,
    messages_copied: AtomicU64,
    messages_skipped: AtomicU64,
}

impl CopyCounters {
    pub fn folders_copied(&self) -> u64 {
        self.folders_copied.load(Ordering::Relaxed)
    }

    pub fn folders_skipped(&self) -> u64 {
        self.folders_skipped.load(Ordering::Relaxed)
    }

    pub fn messages_copied(&self) -> u64 {
        self.messages_copied.load(Ordering::Relaxed)
    }

    pub fn messages_skipped(&self) -> u64 {
        self.messages_skipped.load(Ordering::Relaxed)
    }
}

/// The state shared by the copier and its tasks.
struct CopyContext<S: Store, T: Store> {
    source: Arc<S>,
    target: Arc<T>,
    source_index: Arc<FolderIndex>,
    target_index: Arc<FolderIndex>,
    counters: Arc<CopyCounters>,
    failed: AtomicBool,
    exceptions: Mutex<Vec<Arc<Error>>>,
}

impl<S: Store, T: Store> CopyContext<S, T> {
    fn add_copy_exception(&self, err: Error) {
        debug!("{err}");
        trace!("{err:?}");

        self.exceptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(err));
        self.failed.store(true, Ordering::Release);
    }
}

/// The store copier.
pub struct StoreCopier<S: Store, T: Store> {
    ctx: Arc<CopyContext<S, T>>,
    threads: usize,
    batch_size: usize,
    timeout: Duration,
}

impl<S: Store, T: Store> StoreCopier<S, T> {
    /// Create a new copier.
    ///
    /// The target index is expected to be filled by a crawl of the
    /// target store. The source index gets filled by the copy, for a
    /// later deletion phase.
    pub fn new(
        source: Arc<S>,
        target: Arc<T>,
        source_index: Arc<FolderIndex>,
        target_index: Arc<FolderIndex>,
    ) -> Self {
        let ctx = CopyContext {
            source,
            target,
            source_index,
            target_index,
            counters: Default::default(),
            failed: AtomicBool::new(false),
            exceptions: Mutex::new(Vec::new()),
        };

        Self {
            ctx: Arc::new(ctx),
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

    pub fn counters(&self) -> Arc<CopyCounters> {
        self.ctx.counters.clone()
    }

    pub fn has_copy_exception(&self) -> bool {
        self.ctx.failed.load(Ordering::Acquire)
    }

    /// Get a snapshot of the recorded copy exceptions.
    pub fn copy_exceptions(&self) -> Vec<Arc<Error>> {
        self.ctx
            .exceptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy the source folders then the source messages to the
    /// target.
    ///
    /// Only failures that prevent the copy from starting or finishing
    /// are returned, any other failure is recorded as a copy
    /// exception.
    pub async fn copy(&self) -> Result<()> {
        let root = self
            .ctx
            .source
            .default_folder()
            .await
            .map_err(Error::GetRootFolderError)?;

        self.ctx.source_index.set_separator(root.separator());

        let folders = self.copy_folders(root).await;

        info!(
            copied = self.ctx.counters.folders_copied(),
            skipped = self.ctx.counters.folders_skipped(),
            "source folders copied"
        );

        let pool = ThreadPoolBuilder::new(self.ctx.clone())
            .with_size(self.threads)
            .build();

        self.copy_messages(&pool, folders).await;

        pool.drain(self.timeout)
            .await
            .map_err(Error::DrainPoolError)?;

        info!(
            copied = self.ctx.counters.messages_copied(),
            skipped = self.ctx.counters.messages_skipped(),
            exceptions = self.copy_exceptions().len(),
            "source messages copied"
        );

        Ok(())
    }

    /// Replicate the source folder tree on the target.
    ///
    /// Returns the source and target names of every message-bearing
    /// folder that exists on both sides.
    async fn copy_folders(&self, root: S::Folder) -> Vec<(String, String)> {
        let translator = FolderNameTranslator::new(&self.ctx.source_index, &self.ctx.target_index);
        let mut origins = HashMap::new();
        let mut copies = Vec::new();
        let mut folders = vec![root];

        while let Some(folder) = folders.pop() {
            let name = folder.full_name().to_owned();
            let kind = folder.kind();

            if !name.is_empty() {
                match self
                    .copy_folder(&translator, &mut origins, &name, kind)
                    .await
                {
                    Ok(target_name) if kind.holds_messages() => {
                        copies.push((name.clone(), target_name));
                    }
                    Ok(_) => (),
                    Err(err) => self.ctx.add_copy_exception(err),
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
                        self.ctx.add_copy_exception(err);
                    }
                }
            }
        }

        copies
    }

    async fn copy_folder(
        &self,
        translator: &FolderNameTranslator,
        origins: &mut HashMap<String, String>,
        name: &str,
        kind: FolderType,
    ) -> Result<String> {
        self.ctx.source_index.add_folder(name);

        let target_name = translator.translate(name);

        match origins.entry(target_name.clone()) {
            Entry::Occupied(entry) => {
                let origin = entry.get().clone();
                return Err(Error::ConflictingFolderNameError(
                    name.to_owned(),
                    origin,
                    target_name,
                ));
            }
            Entry::Vacant(entry) => {
                entry.insert(name.to_owned());
            }
        }

        let counters = &self.ctx.counters;

        if self.ctx.target_index.contains_folder(&target_name) {
            trace!(source = name, target = target_name, "target folder already exists");
            counters.folders_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(target_name);
        }

        let folder = self
            .ctx
            .target
            .folder(&target_name)
            .await
            .map_err(|err| Error::GetTargetFolderError(err, target_name.clone()))?;

        let created = folder
            .create(kind)
            .await
            .map_err(|err| Error::CreateFolderError(err, target_name.clone()))?;

        self.ctx.target_index.add_folder(&target_name);

        if created {
            debug!(source = name, target = target_name, %kind, "target folder created");
            counters.folders_copied.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.folders_skipped.fetch_add(1, Ordering::Relaxed);
        }

        Ok(target_name)
    }

    async fn copy_messages(
        &self,
        pool: &ThreadPool<CopyContext<S, T>>,
        folders: Vec<(String, String)>,
    ) {
        for (source_name, target_name) in folders {
            let count = match self.count_messages(&source_name).await {
                Ok(count) => count,
                Err(err) => {
                    self.ctx.add_copy_exception(err);
                    continue;
                }
            };

            let batches = batches(count, self.batch_size);
            debug!(folder = source_name, count, batches = batches.len(), "copying folder");

            for batch in batches {
                let source_name = source_name.clone();
                let target_name = target_name.clone();
                pool.execute(move |ctx| copy_batch(ctx, source_name, target_name, batch));
            }
        }
    }

    async fn count_messages(&self, name: &str) -> Result<usize> {
        let folder = self
            .ctx
            .source
            .folder(name)
            .await
            .map_err(|err| Error::GetSourceFolderError(err, name.to_owned()))?;

        folder
            .message_count()
            .await
            .map_err(|err| Error::CountMessagesError(err, name.to_owned()))
    }
}

#[derive(Debug, Default)]
struct Counts {
    copied: u64,
    skipped: u64,

    /// Source messages recorded into the source index.
    indexed: u64,

    /// Source messages left out of the source index, either
    /// duplicated or without identity.
    unindexed: u64,
}

async fn copy_batch<S: Store, T: Store>(
    ctx: Arc<CopyContext<S, T>>,
    source_name: String,
    target_name: String,
    batch: Batch,
) {
    trace!(source = source_name, target = target_name, %batch, "copying messages");

    let mut counts = Counts::default();

    let copied = copy_batch_messages(&ctx, &source_name, &target_name, batch, &mut counts).await;

    if let Err(err) = copied {
        ctx.add_copy_exception(err);
    }

    let counters = &ctx.counters;
    counters.messages_copied.fetch_add(counts.copied, Ordering::Relaxed);
    counters.messages_skipped.fetch_add(counts.skipped, Ordering::Relaxed);

    ctx.source_index.record_indexed(counts.indexed);
    ctx.source_index.record_skipped(counts.unindexed);
}

async fn copy_batch_messages<S: Store, T: Store>(
    ctx: &CopyContext<S, T>,
    source_name: &str,
    target_name: &str,
    batch: Batch,
    counts: &mut Counts,
) -> Result<()> {
    let mut source = ctx
        .source
        .folder(source_name)
        .await
        .map_err(|err| Error::GetSourceFolderError(err, source_name.to_owned()))?;

    source
        .open(OpenMode::ReadWrite)
        .await
        .map_err(|err| Error::OpenSourceFolderError(err, source_name.to_owned()))?;

    let copied = copy_opened_batch(ctx, &source, source_name, target_name, batch, counts).await;

    let closed = source
        .close(false)
        .await
        .map_err(|err| Error::CloseSourceFolderError(err, source_name.to_owned()));

    copied?;
    closed
}

async fn copy_opened_batch<S: Store, T: Store>(
    ctx: &CopyContext<S, T>,
    source: &S::Folder,
    source_name: &str,
    target_name: &str,
    batch: Batch,
    counts: &mut Counts,
) -> Result<()> {
    let mut messages = source
        .messages(batch.start, batch.end)
        .await
        .map_err(|err| {
            Error::GetMessagesError(err, source_name.to_owned(), batch.start, batch.end)
        })?;

    source
        .fetch(&mut messages, &FetchProfile::fingerprint())
        .await
        .map_err(|err| {
            Error::FetchHeadersError(err, source_name.to_owned(), batch.start, batch.end)
        })?;

    let source_fingerprints = ctx.source_index.folder_messages(source_name);
    let target_fingerprints = ctx.target_index.folder_messages(target_name);

    let mut queued = Vec::new();
    let mut claims = Vec::new();

    for mut msg in messages {
        let fingerprint = match Fingerprint::from_message(&msg) {
            Ok(fingerprint) => fingerprint,
            Err(err) if err.is_protocol_failure() => {
                release(&target_fingerprints, &claims);
                return Err(Error::FingerprintError(err, source_name.to_owned()));
            }
            Err(err) => {
                trace!(folder = source_name, "skipping message: {err}");
                counts.skipped += 1;
                counts.unindexed += 1;
                continue;
            }
        };

        if source_fingerprints.insert(fingerprint.clone()) {
            counts.indexed += 1;
        } else {
            counts.unindexed += 1;
        }

        // inserting claims the message, so that no other task of the
        // run appends it again
        if target_fingerprints.insert(fingerprint.clone()) {
            msg.set_peek(true);
            queued.push(msg);
            claims.push(fingerprint);
        } else {
            counts.skipped += 1;
        }
    }

    if queued.is_empty() {
        return Ok(());
    }

    let mut appended = 0;
    let res = append_messages(
        ctx,
        source,
        (source_name, target_name),
        batch,
        &mut queued,
        &mut appended,
    )
    .await;

    if res.is_err() {
        release(&target_fingerprints, &claims[appended..]);
    }

    counts.copied += appended as u64;
    res
}

async fn append_messages<S: Store, T: Store>(
    ctx: &CopyContext<S, T>,
    source: &S::Folder,
    (source_name, target_name): (&str, &str),
    batch: Batch,
    messages: &mut [<S::Folder as Folder>::Message],
    appended: &mut usize,
) -> Result<()> {
    source
        .fetch(messages, &FetchProfile::full())
        .await
        .map_err(|err| {
            Error::FetchContentError(err, source_name.to_owned(), batch.start, batch.end)
        })?;

    let mut target = ctx
        .target
        .folder(target_name)
        .await
        .map_err(|err| Error::GetTargetFolderError(err, target_name.to_owned()))?;

    target
        .open(OpenMode::ReadWrite)
        .await
        .map_err(|err| Error::OpenTargetFolderError(err, target_name.to_owned()))?;

    let mut res = Ok(());

    for msg in messages.iter() {
        let raw = match msg.to_raw() {
            Ok(raw) => raw,
            Err(err) => {
                res = Err(Error::ExtractMessageError(err, source_name.to_owned()));
                break;
            }
        };

        if let Err(err) = target.append_messages(&[raw]).await {
            res = Err(Error::AppendMessageError(err, target_name.to_owned()));
            break;
        }

        *appended += 1;
    }

    let closed = target
        .close(false)
        .await
        .map_err(|err| Error::CloseTargetFolderError(err, target_name.to_owned()));

    res?;
    closed
}

fn release(fingerprints: &FingerprintSet, claims: &[Fingerprint]) {
    for fingerprint in claims {
        fingerprints.remove(fingerprint);
    }
}
