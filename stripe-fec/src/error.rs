/// Error type definitions
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FecError {
    #[error("invalid parameters: required {required}, total {total} (need 0 < required <= total <= 256)")]
    InvalidParameters { required: usize, total: usize },

    #[error("not enough shares: got {got}, required {required}")]
    TooFewShares { got: usize, required: usize },

    #[error("share number {number} out of range (total {total})")]
    InvalidShareNumber { number: usize, total: usize },

    #[error("duplicate share number {number}")]
    DuplicateShare { number: usize },

    #[error("shares have inconsistent sizes")]
    ShareSizeMismatch,

    #[error("data length {len} is not a positive multiple of {required}")]
    InvalidDataLength { len: usize, required: usize },

    #[error("too many altered shares to correct")]
    TooManyErrors,
}

pub type Result<T> = std::result::Result<T, FecError>;
