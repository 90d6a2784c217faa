use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a persisted line could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {field} amount '{value}': {reason}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid {field} '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid active flag '{0}'")]
    InvalidBool(String),

    #[error("invalid entry id '{0}'")]
    InvalidId(String),
}

/// A malformed line in one of the store files.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record '{line}': {kind}")]
pub struct DecodeError {
    pub line: String,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(line: &str, kind: DecodeErrorKind) -> Self {
        Self {
            line: line.to_string(),
            kind,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path}: line {line_no}: {source}")]
    Decode {
        path: PathBuf,
        line_no: usize,
        #[source]
        source: DecodeError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store is busy: could not lock {path} within {waited:?}")]
    Busy { path: PathBuf, waited: Duration },

    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, StoreError::Decode { .. })
    }
}
