use std::{any::Any, result};

use thiserror::Error;

use super::Operation;
use crate::{AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot authenticate user {0}: invalid credentials")]
    AuthenticateError(String),
    #[error("cannot {1} folder {0}: server refused the operation")]
    RefusedOperationError(String, Operation),
    #[error("cannot {2} message {1} of folder {0}: server refused the operation")]
    RefusedMessageOperationError(String, u64, Operation),
    #[error("cannot find folder {0}")]
    FolderNotFoundError(String),
    #[error("cannot access messages of folder {0}: folder is not open")]
    FolderNotOpenError(String),
    #[error("cannot get messages {1}:{2} of folder {0}: folder has {3} messages")]
    MessagesOutOfRangeError(String, usize, usize, usize),
    #[error("cannot find message {1} in folder {0}")]
    MessageNotFoundError(String, u64),
    #[error("cannot extract message {1} of folder {0}: content was not fetched")]
    ContentNotFetchedError(String, u64),
    #[error("cannot delete folder {0}: folder has children")]
    DeleteNonEmptyFolderError(String),
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
