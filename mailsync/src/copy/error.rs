use std::{any::Any, result};

use thiserror::Error;

use crate::{fingerprint, thread_pool, AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot get root folder of source store")]
    GetRootFolderError(#[source] AnyBoxedError),
    #[error("cannot list children of source folder {1}")]
    ListFoldersError(#[source] AnyBoxedError, String),
    #[error("cannot copy folder {0}: target folder {2} is already the copy of {1}")]
    ConflictingFolderNameError(String, String, String),
    #[error("cannot get source folder {1}")]
    GetSourceFolderError(#[source] AnyBoxedError, String),
    #[error("cannot get target folder {1}")]
    GetTargetFolderError(#[source] AnyBoxedError, String),
    #[error("cannot create target folder {1}")]
    CreateFolderError(#[source] AnyBoxedError, String),
    #[error("cannot count messages of source folder {1}")]
    CountMessagesError(#[source] AnyBoxedError, String),
    #[error("cannot open source folder {1}")]
    OpenSourceFolderError(#[source] AnyBoxedError, String),
    #[error("cannot open target folder {1}")]
    OpenTargetFolderError(#[source] AnyBoxedError, String),
    #[error("cannot close source folder {1}")]
    CloseSourceFolderError(#[source] AnyBoxedError, String),
    #[error("cannot close target folder {1}")]
    CloseTargetFolderError(#[source] AnyBoxedError, String),
    #[error("cannot get messages {2}:{3} of source folder {1}")]
    GetMessagesError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot fetch headers of messages {2}:{3} of source folder {1}")]
    FetchHeadersError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot fetch content of messages {2}:{3} of source folder {1}")]
    FetchContentError(#[source] AnyBoxedError, String, usize, usize),
    #[error("cannot index message of source folder {1}")]
    FingerprintError(#[source] fingerprint::Error, String),
    #[error("cannot extract message of source folder {1}")]
    ExtractMessageError(#[source] AnyBoxedError, String),
    #[error("cannot append message to target folder {1}")]
    AppendMessageError(#[source] AnyBoxedError, String),
    #[error("cannot wait for copy tasks to finish")]
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
