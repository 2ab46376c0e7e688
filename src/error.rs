//! Error types for the function cache
//!
//! Provides unified error handling using thiserror.

use std::convert::Infallible;

use thiserror::Error;

use crate::cache::CacheKey;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// `E` is the error type of the memoized computation. Operations that never
/// run a computation (delete, configuration) use the `Infallible` default.
#[derive(Error, Debug)]
pub enum CacheError<E = Infallible> {
    /// The computation failed; the failure is never cached
    #[error("Computation failed: {0}")]
    Computation(E),

    /// A set or delete callback returned an error
    #[error("Callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// Arguments or identifier could not be canonically serialized
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The cached value under this key has a different type than requested
    #[error("Type mismatch for cached value at {key}")]
    TypeMismatch { key: CacheKey },

    /// A TTL was requested outside of a Tokio runtime
    #[error("TTL expiry requires a running Tokio runtime")]
    NoRuntime,
}

impl CacheError<Infallible> {
    /// Re-types an error that cannot carry a computation failure.
    pub fn widen<E>(self) -> CacheError<E> {
        match self {
            CacheError::Computation(never) => match never {},
            CacheError::Callback(err) => CacheError::Callback(err),
            CacheError::Serialize(err) => CacheError::Serialize(err),
            CacheError::TypeMismatch { key } => CacheError::TypeMismatch { key },
            CacheError::NoRuntime => CacheError::NoRuntime,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T, E = Infallible> = std::result::Result<T, CacheError<E>>;
