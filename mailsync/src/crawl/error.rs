use std::{any::Any, result, sync::Arc};

use thiserror::Error;

use crate::{fingerprint, thread_pool, AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot get root folder of store")]
    GetRootFolderError(#[source] AnyBoxedError),
    #[error("cannot get folder {1}")]
    GetFolderError(#[source] AnyBoxedError, String),
    #[error("cannot list children of folder {1}")]
    ListFoldersError(#[source] AnyBoxedError, String),
    #[error("cannot count messages of folder {1}")]
    CountMessagesError(#[source] AnyBoxedError, String),
    #[error("cannot open folder {1}")]
    OpenFolderError(#[source] AnyBoxedError, String),
    #[error("cannot close folder {1}")]
    CloseFolderError(#[source] AnyBoxedError, String),
    #[error("cannot get messages {2}:{3} of folder {1}")]
    GetMessagesError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot fetch messages {2}:{3} of folder {1}")]
    FetchMessagesError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot index message of folder {1}")]
    FingerprintError(#[source] fingerprint::Error, String),
    #[error("cannot wait for crawl tasks to finish")]
    DrainPoolError(#[source] thread_pool::Error),
    #[error("cannot crawl store")]
    CrawlExceptionError(#[source] Arc<Error>),
}

impl AnyError for Error {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<Error> for AnyBoxedError {
    fn from(err: Error) -> Self {
        Box::new(err)
    }
}
