use serde::Serialize;
use thiserror::Error;

/// Errors local to a single (pair, venue) combination.
///
/// None of these abort a scan: the scanner converts each one into the
/// outcome of the combination it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum ScanError {
    #[error("token metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("pool locator unavailable: {0}")]
    LocatorUnavailable(String),

    #[error("reserves unavailable: {0}")]
    ReserveUnavailable(String),

    /// The pool's internal tokens do not match the requested pair.
    #[error("pair mismatch: {0}")]
    PairMismatch(String),

    #[error("price undefined: {0}")]
    UndefinedPrice(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("no reserve reader registered for pool model {0}")]
    UnsupportedPoolModel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Fieldless tag of a [`ScanError`], handy for counting and matching in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    MetadataUnavailable,
    LocatorUnavailable,
    ReserveUnavailable,
    PairMismatch,
    UndefinedPrice,
    Timeout,
    UnsupportedPoolModel,
    InvalidConfig,
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::MetadataUnavailable(_) => ErrorKind::MetadataUnavailable,
            ScanError::LocatorUnavailable(_) => ErrorKind::LocatorUnavailable,
            ScanError::ReserveUnavailable(_) => ErrorKind::ReserveUnavailable,
            ScanError::PairMismatch(_) => ErrorKind::PairMismatch,
            ScanError::UndefinedPrice(_) => ErrorKind::UndefinedPrice,
            ScanError::Timeout(_) => ErrorKind::Timeout,
            ScanError::UnsupportedPoolModel(_) => ErrorKind::UnsupportedPoolModel,
            ScanError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Data-integrity failures that point at a locator/reader contract violation.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, ScanError::PairMismatch(_))
    }
}
