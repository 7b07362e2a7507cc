use std::{any::Any, result};

use thiserror::Error;

use crate::{copy, crawl, delete, AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open source store {1}")]
    OpenSourceStoreError(#[source] AnyBoxedError, String),
    #[error("cannot open target store {1}")]
    OpenTargetStoreError(#[source] AnyBoxedError, String),
    #[error("cannot close source store")]
    CloseSourceStoreError(#[source] AnyBoxedError),
    #[error("cannot close target store")]
    CloseTargetStoreError(#[source] AnyBoxedError),
    #[error("cannot crawl target store")]
    CrawlTargetError(#[source] crawl::Error),
    #[error("cannot copy source store to target store")]
    CopyError(#[source] copy::Error),
    #[error("cannot delete from target store")]
    DeleteError(#[source] delete::Error),
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
