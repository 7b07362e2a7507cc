use std::{any::Any, result, time::Duration};

use thiserror::Error;
use tokio::task::JoinError;

use crate::{AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot drain thread pool: tasks still running after {0:?}")]
    DrainTimeoutError(Duration),
    #[error("cannot join thread {1}/{2} of the pool")]
    JoinThreadError(#[source] JoinError, usize, usize),
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
