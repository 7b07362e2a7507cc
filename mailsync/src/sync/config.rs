//! # Sync config
//!
//! Module dedicated to the synchronization configuration.

use std::time::Duration;

use crate::{batch::DEFAULT_BATCH_SIZE, copy, crawl, delete, store::HostDefinition};

/// The default number of workers per phase.
pub const DEFAULT_THREADS: usize = 5;

/// The synchronization configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case", default)
)]
pub struct SyncConfig {
    /// The store messages are copied from.
    pub source: HostDefinition,

    /// The store messages are copied to.
    pub target: HostDefinition,

    /// The number of workers of each phase, which is also the number
    /// of connections requested to each store.
    pub threads: usize,

    /// The number of messages processed by a single task.
    pub batch_size: usize,

    /// Remove from the target the folders and messages that do not
    /// exist on the source.
    pub delete: bool,

    /// The maximum time, in seconds, to wait for the crawl tasks.
    pub crawl_timeout: u64,

    /// The maximum time, in seconds, to wait for the copy tasks.
    pub copy_timeout: u64,

    /// The maximum time, in seconds, to wait for the delete tasks.
    pub delete_timeout: u64,
}

impl SyncConfig {
    pub fn new(source: HostDefinition, target: HostDefinition) -> Self {
        Self {
            source,
            target,
            ..Default::default()
        }
    }

    pub fn get_crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl_timeout)
    }

    pub fn get_copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout)
    }

    pub fn get_delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: Default::default(),
            target: Default::default(),
            threads: DEFAULT_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            delete: false,
            crawl_timeout: crawl::DEFAULT_TIMEOUT.as_secs(),
            copy_timeout: copy::DEFAULT_TIMEOUT.as_secs(),
            delete_timeout: delete::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}
