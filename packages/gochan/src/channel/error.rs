// channel error types.

use std::fmt::{self, Debug, Formatter};
use thiserror::Error;


/// Error for trying to push into a channel which has been closed
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("channel closed")]
pub struct ClosedError;

/// Error for trying to push into a channel which has been closed, returning the rejected item
///
/// A push fails this way if the channel was already closed when the push began, or if it was
/// closed while the push was waiting for room.
#[derive(Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("pushed into a closed channel")]
pub struct PushError<T> {
    /// The item that could not be pushed
    pub item: T,
}

impl<T> PushError<T> {
    /// Take back the item that could not be pushed
    pub fn into_inner(self) -> T {
        self.item
    }

    /// The reason the item could not be pushed
    pub fn cause(&self) -> ClosedError {
        ClosedError
    }
}

impl<T> Debug for PushError<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("PushError").finish_non_exhaustive()
    }
}

impl<T> From<PushError<T>> for ClosedError {
    fn from(_: PushError<T>) -> Self {
        ClosedError
    }
}
