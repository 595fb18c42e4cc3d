//! Crate error type definitions

use thiserror::Error;

/// Errors returned by fallible [`AggregateError`](`crate::AggregateError`) constructors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The chained cause of an aggregate built from a list is the first element of that list,
    /// so the list cannot be empty.
    #[error("cannot build an aggregate error from an empty error list")]
    EmptyErrorList,
}
