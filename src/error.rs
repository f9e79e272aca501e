use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdfError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Signal {channel} ({label}): digital min equals digital max")]
    DegenerateCalibration { channel: usize, label: String },

    #[error("Cannot resolve patient identity: {0}")]
    UnresolvedIdentity(String),

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("Event sheet error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EdfError>;

/// Recoverable problems met while decoding data records
///
/// A cut or overflowing block stays zero-filled in the sample grid; an
/// unreadable TAL is left out of the annotations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeWarning {
    #[error("truncated stream in record {record}, signal {channel}: expected {expected} samples, got {got}")]
    TruncatedStream {
        record: usize,
        channel: usize,
        expected: usize,
        got: usize,
    },

    #[error("signal {channel} data of record {record} exceeds allocated space")]
    GridOverflow { record: usize, channel: usize },

    #[error("signal {channel} annotation block of record {record}: {skipped} unreadable TAL(s) skipped")]
    MalformedAnnotation {
        record: usize,
        channel: usize,
        skipped: usize,
    },
}

/// A fixed-width header field that could not be read as a number.
///
/// This is never fatal: the header parser replaces the value with its
/// zero default and records a [`FieldDefault`](crate::types::FieldDefault).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed field: {raw:?}")]
pub struct FieldError {
    pub raw: String,
}
