mod attr;
mod block;
mod block_stream;
mod manifest;
mod meta_client;

pub use attr::*;
pub use block::*;
pub use block_stream::*;
pub use manifest::*;
pub use meta_client::*;

use std::fmt;
use thiserror::Error;

#[macro_use]
extern crate log;

#[derive(Error, Debug)]
pub enum DfsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("block stream error: {0}")]
    Stream(#[from] std::io::Error),
    #[error("local io error: {0}")]
    Io(String),
    #[error("metadata inconsistency: {0}")]
    MetadataInconsistency(String),
    #[error("end of file")]
    Eof,
}

impl DfsError {
    pub fn is_eof(&self) -> bool {
        matches!(self, DfsError::Eof)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DfsError::NotFound(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DfsError::InvalidArgument(_))
    }
}

pub type DfsResult<T> = std::result::Result<T, DfsError>;

/// A listing that stopped early. `entries` holds everything received before
/// `error` occurred, in listing order.
#[derive(Debug)]
pub struct PartialListing<T> {
    pub entries: Vec<T>,
    pub error: DfsError,
}

impl<T> PartialListing<T> {
    pub fn new(entries: Vec<T>, error: DfsError) -> Self {
        Self { entries, error }
    }

    pub fn is_eof(&self) -> bool {
        self.error.is_eof()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PartialListing<U> {
        PartialListing {
            entries: self.entries.into_iter().map(f).collect(),
            error: self.error,
        }
    }
}

impl<T> fmt::Display for PartialListing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} entries)", self.error, self.entries.len())
    }
}

impl<T: fmt::Debug> std::error::Error for PartialListing<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<PartialListing<T>> for DfsError {
    fn from(partial: PartialListing<T>) -> Self {
        partial.error
    }
}

impl<T> From<DfsError> for PartialListing<T> {
    fn from(error: DfsError) -> Self {
        PartialListing::new(Vec::new(), error)
    }
}

pub type ListResult<T> = std::result::Result<Vec<T>, PartialListing<T>>;
