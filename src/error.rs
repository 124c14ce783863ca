use crate::listing::{Amount, ListingId};
use serde::Serialize;
use thiserror::Error;

/// Why an operation on a listing or its bids was refused
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("listing not found: {0}")]
    NotFound(ListingId),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidAmount(&'static str),
    #[error("bid must be higher than the current highest bid of {highest}")]
    BidTooLow { highest: Amount },
    #[error("no bid found to cancel")]
    NoBidToCancel,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    InvalidAmount,
    BidTooLow,
    NoBidToCancel,
    Unauthorized,
    StorageError,
}

impl ListingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ListingError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ListingError::NotFound(_) => ErrorKind::NotFound,
            ListingError::Validation(_) => ErrorKind::ValidationError,
            ListingError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            ListingError::BidTooLow { .. } => ErrorKind::BidTooLow,
            ListingError::NoBidToCancel => ErrorKind::NoBidToCancel,
            ListingError::Unauthorized(_) => ErrorKind::Unauthorized,
            ListingError::Storage(_) => ErrorKind::StorageError,
        }
    }
}

pub type ListingResult<T> = Result<T, ListingError>;
