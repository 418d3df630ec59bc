//! Errors raised while constructing shared types from untrusted input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("unknown item state ordinal: {0}")]
    UnknownStateOrdinal(u8),

    #[error("unknown item state name: {0}")]
    UnknownStateName(String),

    #[error("invalid hash id: {0}")]
    InvalidHashId(String),

    #[error("malformed item result: {0}")]
    MalformedResult(String),
}
