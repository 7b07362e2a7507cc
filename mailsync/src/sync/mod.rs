//! # Synchronization
//!
//! Module dedicated to the mirroring of a source store onto a target
//! store. The main structure of this module is [`SyncBuilder`].
//!
//! A synchronization crawls the target store, copies the source store
//! onto the target, closes both stores, then deletes from the target
//! what no longer exists on the source. The deletion only happens when
//! it has been enabled and when the copy did not record any
//! exception: an incomplete source index would otherwise lead to the
//! removal of legitimate target messages.

pub mod config;
mod error;
pub mod progress;
pub mod report;

use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use tracing::{debug, info, trace, warn};

#[doc(inline)]
pub use self::{
    config::SyncConfig,
    error::{Error, Result},
    progress::SyncProgress,
    report::{CopyReport, CrawlReport, DeleteReport, SyncReport},
};
use crate::{
    copy::StoreCopier,
    crawl::StoreCrawler,
    delete::StoreDeleter,
    index::FolderIndex,
    store::{HostDefinition, Store, StoreBuilder},
    AnyBoxedError, AnyResult,
};

/// The synchronization builder.
#[derive(Clone)]
pub struct SyncBuilder<S: StoreBuilder, T: StoreBuilder> {
    config: SyncConfig,
    source_builder: S,
    target_builder: T,
    handler: Option<Arc<SyncEventHandler>>,
    progress: SyncProgress,
}

impl<S: StoreBuilder, T: StoreBuilder> SyncBuilder<S, T> {
    /// Create a new synchronization builder using the given config
    /// and the two given store builders.
    pub fn new(config: SyncConfig, source_builder: S, target_builder: T) -> Self {
        Self {
            config,
            source_builder,
            target_builder,
            handler: None,
            progress: SyncProgress::new(),
        }
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.config.threads = threads.max(1);
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.set_threads(threads);
        self
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.config.batch_size = batch_size.max(1);
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.set_batch_size(batch_size);
        self
    }

    pub fn set_delete(&mut self, delete: bool) {
        self.config.delete = delete;
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.set_delete(delete);
        self
    }

    pub fn set_crawl_timeout(&mut self, timeout: Duration) {
        self.config.crawl_timeout = timeout.as_secs();
    }

    pub fn with_crawl_timeout(mut self, timeout: Duration) -> Self {
        self.set_crawl_timeout(timeout);
        self
    }

    pub fn set_copy_timeout(&mut self, timeout: Duration) {
        self.config.copy_timeout = timeout.as_secs();
    }

    pub fn with_copy_timeout(mut self, timeout: Duration) -> Self {
        self.set_copy_timeout(timeout);
        self
    }

    pub fn set_delete_timeout(&mut self, timeout: Duration) {
        self.config.delete_timeout = timeout.as_secs();
    }

    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.set_delete_timeout(timeout);
        self
    }

    pub fn set_some_handler<F: Future<Output = AnyResult<()>> + Send + 'static>(
        &mut self,
        handler: Option<impl Fn(SyncEvent) -> F + Send + Sync + 'static>,
    ) {
        self.handler = match handler {
            Some(handler) => Some(Arc::new(move |evt| Box::pin(handler(evt)))),
            None => None,
        };
    }

    pub fn set_handler<F: Future<Output = AnyResult<()>> + Send + 'static>(
        &mut self,
        handler: impl Fn(SyncEvent) -> F + Send + Sync + 'static,
    ) {
        self.set_some_handler(Some(handler));
    }

    pub fn with_some_handler<F: Future<Output = AnyResult<()>> + Send + 'static>(
        mut self,
        handler: Option<impl Fn(SyncEvent) -> F + Send + Sync + 'static>,
    ) -> Self {
        self.set_some_handler(handler);
        self
    }

    pub fn with_handler<F: Future<Output = AnyResult<()>> + Send + 'static>(
        mut self,
        handler: impl Fn(SyncEvent) -> F + Send + Sync + 'static,
    ) -> Self {
        self.set_handler(handler);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get a handle on the progress of the synchronization.
    ///
    /// The handle can be taken before [`SyncBuilder::sync`] is called
    /// and read from another task while it runs.
    pub fn progress(&self) -> SyncProgress {
        self.progress.clone()
    }

    /// Mirror the source store onto the target store.
    pub async fn sync(self) -> Result<SyncReport> {
        info!(
            source = %self.config.source,
            target = %self.config.target,
            threads = self.config.threads,
            delete = self.config.delete,
            "starting synchronization"
        );

        self.progress.start();
        let report = self.run().await;
        self.progress.finish();

        let mut report = report?;
        report.elapsed = self.progress.elapsed();

        info!(
            elapsed = report.elapsed.as_secs(),
            exceptions = report.copy.exceptions.len(),
            "synchronization finished"
        );

        Ok(report)
    }

    async fn run(&self) -> Result<SyncReport> {
        let config = &self.config;
        let source_index = Arc::new(FolderIndex::new());
        let target_index = Arc::new(FolderIndex::new());
        self.progress.set_target_index(target_index.clone());

        let mut report = SyncReport::default();

        // crawl target

        let target = open_store(&self.target_builder, &config.target, config.threads)
            .await
            .map_err(|err| Error::OpenTargetStoreError(err, config.target.to_string()))?;

        let crawler = StoreCrawler::new(target.clone(), target_index.clone())
            .with_threads(config.threads)
            .with_batch_size(config.batch_size)
            .with_timeout(config.get_crawl_timeout());

        if let Err(err) = crawler.crawl().await {
            close_store(target.as_ref(), Error::CloseTargetStoreError).await;
            return Err(Error::CrawlTargetError(err));
        }

        report.crawl = CrawlReport::from(target_index.as_ref());

        SyncEvent::CrawledTarget(report.crawl.messages_indexed, report.crawl.messages_skipped)
            .emit(&self.handler)
            .await;

        // copy source to target

        let source = match open_store(&self.source_builder, &config.source, config.threads).await {
            Ok(source) => source,
            Err(err) => {
                close_store(target.as_ref(), Error::CloseTargetStoreError).await;
                let err = Error::OpenSourceStoreError(err, config.source.to_string());
                return Err(err);
            }
        };

        let copier = StoreCopier::new(
            source.clone(),
            target.clone(),
            source_index.clone(),
            target_index.clone(),
        )
        .with_threads(config.threads)
        .with_batch_size(config.batch_size)
        .with_timeout(config.get_copy_timeout());

        self.progress.set_copy_counters(copier.counters());

        let copied = copier.copy().await;

        close_store(source.as_ref(), Error::CloseSourceStoreError).await;
        close_store(target.as_ref(), Error::CloseTargetStoreError).await;

        copied.map_err(Error::CopyError)?;

        report.copy = CopyReport::new(&copier.counters(), copier.copy_exceptions());

        SyncEvent::CopiedFolders(report.copy.folders_copied, report.copy.folders_skipped)
            .emit(&self.handler)
            .await;
        SyncEvent::CopiedMessages(report.copy.messages_copied, report.copy.messages_skipped)
            .emit(&self.handler)
            .await;

        // delete from target

        if !config.delete {
            return Ok(report);
        }

        if report.has_copy_exception() {
            let n = report.copy.exceptions.len();
            warn!("{n} copy exception(s) recorded, skipping deletion");
            SyncEvent::SkippedDeletion(n).emit(&self.handler).await;
            return Ok(report);
        }

        // the target is reopened since long copies may have let the
        // server drop the session
        let target = open_store(&self.target_builder, &config.target, config.threads)
            .await
            .map_err(|err| Error::OpenTargetStoreError(err, config.target.to_string()))?;

        let deleter = StoreDeleter::new(target.clone(), source_index, target_index)
            .with_threads(config.threads)
            .with_batch_size(config.batch_size)
            .with_timeout(config.get_delete_timeout());

        self.progress.set_delete_counters(deleter.counters());

        let deleted = deleter.delete().await;
        close_store(target.as_ref(), Error::CloseTargetStoreError).await;
        deleted.map_err(Error::DeleteError)?;

        let delete = DeleteReport::from(deleter.counters().as_ref());

        SyncEvent::DeletedFolders(delete.folders_deleted, delete.folders_skipped)
            .emit(&self.handler)
            .await;
        SyncEvent::DeletedMessages(delete.messages_deleted, delete.messages_skipped)
            .emit(&self.handler)
            .await;

        report.delete = Some(delete);
        Ok(report)
    }
}

async fn open_store<B: StoreBuilder>(
    builder: &B,
    host: &HostDefinition,
    threads: usize,
) -> AnyResult<Arc<B::Store>> {
    debug!(%host, "opening store");
    let store = builder.build(host, threads).await?;
    Ok(Arc::new(store))
}

/// Close the given store. Failures are only logged, the work done
/// with the store is complete at this point.
async fn close_store<S: Store>(store: &S, map_err: fn(AnyBoxedError) -> Error) {
    if let Err(err) = store.close().await {
        let err = map_err(err);
        debug!("{err}");
        trace!("{err:?}");
    }
}

/// The synchronization async event handler.
pub type SyncEventHandler =
    dyn Fn(SyncEvent) -> Pin<Box<dyn Future<Output = AnyResult<()>> + Send>> + Send + Sync;

/// The synchronization event.
///
/// Represents the phase boundaries of a synchronization. Counts are
/// given as (processed, skipped) pairs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum SyncEvent {
    CrawledTarget(u64, u64),
    CopiedFolders(u64, u64),
    CopiedMessages(u64, u64),
    SkippedDeletion(usize),
    DeletedFolders(u64, u64),
    DeletedMessages(u64, u64),
}

impl SyncEvent {
    pub async fn emit(&self, handler: &Option<Arc<SyncEventHandler>>) {
        if let Some(handler) = handler.as_ref() {
            if let Err(err) = handler(self.clone()).await {
                debug!("error while emitting sync event: {err}");
                trace!("{err:?}");
            } else {
                debug!("emitted sync event {self:?}");
            }
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::CrawledTarget(indexed, skipped) => {
                write!(f, "Indexed {indexed} target messages, skipped {skipped}")
            }
            SyncEvent::CopiedFolders(copied, skipped) => {
                write!(f, "Copied {copied} folders, skipped {skipped}")
            }
            SyncEvent::CopiedMessages(copied, skipped) => {
                write!(f, "Copied {copied} messages, skipped {skipped}")
            }
            SyncEvent::SkippedDeletion(n) => {
                write!(f, "Skipped deletion after {n} copy exception(s)")
            }
            SyncEvent::DeletedFolders(deleted, skipped) => {
                write!(f, "Deleted {deleted} target folders, kept {skipped}")
            }
            SyncEvent::DeletedMessages(deleted, skipped) => {
                write!(f, "Deleted {deleted} target messages, kept {skipped}")
            }
        }
    }
}
