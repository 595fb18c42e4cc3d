#![cfg_attr(docsrs, feature(doc_cfg))]
//! aggregate-error bundles multiple failures into a single error value.
//!
//! An [`AggregateError`] keeps an ordered list of previously raised errors. It is meant to be
//! filled while running a batch of independent operations and then returned as one error,
//! leaving it to whoever handles it to inspect the individual failures through
//! [`errors`](`AggregateError::errors`).
//!
//! # Features
//!
//! - Thread-safe accumulation. Errors can be added through a shared reference, every read works
//!   on a consistent snapshot.
//! - Flattening. Building an aggregate from a list containing other aggregates unrolls them, so
//!   aggregates are never nested.
//! - Readable reports. The [`Display`](`std::fmt::Display`) implementation enumerates every
//!   recorded error, and [`fmt_stack_trace`](`AggregateError::fmt_stack_trace`) prints each error
//!   trace in turn.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use aggregate_error::AggregateError;
//!
//! # tokio_test::block_on(async {
//! let failures = Arc::new(AggregateError::new());
//!
//! let mut handles = Vec::new();
//! for i in 0..4 {
//!     let failures = failures.clone();
//!     handles.push(tokio::spawn(async move {
//!         failures.add_error(std::io::Error::other(format!("job {i} failed")));
//!     }));
//! }
//! for handle in handles {
//!     handle.await.unwrap();
//! }
//!
//! assert_eq!(failures.len(), 4);
//! println!("{failures}");
//! # })
//! ```
//!
//! # Errors and causes
//!
//! An aggregate also carries an optional chained cause, exposed through
//! [`source`](`std::error::Error::source`). An aggregate built with
//! [`from_errors`](`AggregateError::from_errors`) uses the first error of the list as its cause.
//!
//! # Logging
//!
//! The library emits [tracing](https://crates.io/crates/tracing) events at `TRACE` level
//! whenever errors are added or nested aggregates are flattened, and at `DEBUG` level when a
//! construction is rejected. No subscriber is installed by the library.
//!
//! # Backtraces
//!
//! Backtraces are captured when an error is recorded and when an aggregate is created, following
//! the rules of [`std::backtrace::Backtrace::capture`]. They are only included in stack traces
//! if `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enable them.

mod report;

pub mod aggregate;
pub mod error;
pub mod recorded;
pub mod result;

pub use aggregate::AggregateError;
pub use error::Error;
pub use recorded::{BoxError, RecordedError};
pub use report::LINE_SEPARATOR;
