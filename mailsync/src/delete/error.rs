use std::{any::Any, result};

use thiserror::Error;

use crate::{fingerprint, thread_pool, AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot get root folder of target store")]
    GetRootFolderError(#[source] AnyBoxedError),
    #[error("cannot list children of target folder {1}")]
    ListFoldersError(#[source] AnyBoxedError, String),
    #[error("cannot get target folder {1}")]
    GetFolderError(#[source] AnyBoxedError, String),
    #[error("cannot delete target folder {1}")]
    DeleteFolderError(#[source] AnyBoxedError, String),
    #[error("cannot count messages of target folder {1}")]
    CountMessagesError(#[source] AnyBoxedError, String),
    #[error("cannot open target folder {1}")]
    OpenFolderError(#[source] AnyBoxedError, String),
    #[error("cannot close target folder {1}")]
    CloseFolderError(#[source] AnyBoxedError, String),
    #[error("cannot get messages {2}:{3} of target folder {1}")]
    GetMessagesError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot fetch messages {2}:{3} of target folder {1}")]
    FetchMessagesError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot index message of target folder {1}")]
    FingerprintError(#[source] fingerprint::Error, String),
    #[error("cannot flag message of target folder {1} as deleted")]
    FlagMessageError(#[source] AnyBoxedError, String),
    #[error("cannot wait for earlier batches of target folder {0} before expunging")]
    WaitBatchesError(String),
    #[error("cannot wait for delete tasks to finish")]
    DrainPoolError(#[source] thread_pool::Error),
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
