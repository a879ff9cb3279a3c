//! Crate-wide error type.
//!
//! Each module owns a narrow error enum; this wraps them for callers that
//! drive the whole game.

use thiserror::Error;

use crate::deck::DeckError;
use crate::pack::PackError;
use crate::progress::StoreError;
use crate::queue::QueueError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("progress store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Error::Deck(DeckError::Queue(err))
    }
}

/// Result type alias for [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;
