use std::{any::Any, error, result};

use thiserror::Error;
use tokio::task::JoinError;

use crate::{copy, crawl, delete, fingerprint, sync, thread_pool};

/// The global any `Result` alias of the library.
///
/// The difference with [`Result`] is that it takes a dynamic error
/// `Box<dyn AnyError>`.
pub type AnyResult<T> = result::Result<T, AnyBoxedError>;

/// The global, dowcastable any `Error` trait of the library.
///
/// This trait is used instead of [`Error`] when an error that is not
/// known at compilation time cannot be placed in a generic due to
/// object-safe trait constraint. The main use case is for store
/// implementations.
pub trait AnyError: error::Error + Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl AnyError for JoinError {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The global any boxed `Error` alias of the module.
pub type AnyBoxedError = Box<dyn AnyError + Send + 'static>;

impl error::Error for AnyBoxedError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.as_ref().source()
    }
}

impl From<JoinError> for AnyBoxedError {
    fn from(err: JoinError) -> Self {
        Box::new(err)
    }
}

/// The global `Result` alias of the library.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FingerprintError(#[from] fingerprint::Error),
    #[error(transparent)]
    ThreadPoolError(#[from] thread_pool::Error),
    #[error(transparent)]
    CrawlError(#[from] crawl::Error),
    #[error(transparent)]
    CopyError(#[from] copy::Error),
    #[error(transparent)]
    DeleteError(#[from] delete::Error),
    #[error(transparent)]
    SyncError(#[from] sync::Error),
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
