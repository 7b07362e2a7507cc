use std::{any::Any, result};

use thiserror::Error;

use crate::{AnyBoxedError, AnyError};

/// The global `Result` alias of the module.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the module.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build message fingerprint: message-id and subject are both empty")]
    MissingIdentityError,
    #[error("cannot build message fingerprint: cannot read header {1}")]
    ReadHeaderError(#[source] AnyBoxedError, &'static str),
}

impl Error {
    /// Return `true` if the error comes from the store rather than
    /// from the message itself.
    ///
    /// A message without identity should just be skipped, whereas a
    /// store failure must be escalated.
    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, Self::ReadHeaderError(..))
    }
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
