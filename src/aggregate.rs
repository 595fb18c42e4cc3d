use std::{
    backtrace::Backtrace,
    error::Error as StdError,
    fmt::{self, Display},
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, trace};

use crate::error::Error;
use crate::recorded::RecordedError;
use crate::report;
use crate::result::Result;

/// An error aggregating multiple previously raised errors
///
/// The container keeps the recorded errors in insertion order. Errors can be added concurrently
/// through a shared reference with [`add_error`](`AggregateError::add_error`), and every read
/// operates on a snapshot of the list taken under the same lock.
///
/// Building an aggregate from a list of errors flattens it: any element that is itself an
/// `AggregateError` contributes its recorded errors instead of itself.
///
/// # Example
///
/// ```rust
/// use aggregate_error::{AggregateError, RecordedError};
///
/// let inner = AggregateError::from_errors([std::fmt::Error, std::fmt::Error]).unwrap();
/// let outer = AggregateError::from_errors([
///     RecordedError::from(inner),
///     RecordedError::from(std::io::Error::other("disk full")),
/// ])
/// .unwrap();
///
/// assert_eq!(outer.len(), 3);
/// assert!(outer.errors()[2].is::<std::io::Error>());
/// ```
pub struct AggregateError {
    errors: Mutex<Vec<RecordedError>>,
    cause: Option<RecordedError>,
    backtrace: Backtrace,
}

// Replace nested aggregates by their own recorded errors
fn flatten(errors: Vec<RecordedError>) -> Vec<RecordedError> {
    let mut flat = Vec::with_capacity(errors.len());
    for error in errors {
        if let Some(nested) = error.downcast_ref::<AggregateError>() {
            let nested = nested.errors();
            trace!(count = nested.len(), "flattening nested aggregate error");
            flat.extend(nested);
        } else {
            flat.push(error);
        }
    }
    flat
}

impl AggregateError {
    fn from_parts(errors: Vec<RecordedError>, cause: Option<RecordedError>) -> Self {
        Self {
            errors: Mutex::new(errors),
            cause,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create an empty aggregate, with no recorded errors and no cause
    pub fn new() -> Self {
        Self::from_parts(Vec::new(), None)
    }

    /// Create an aggregate from a list of errors
    ///
    /// The first error of the list becomes the chained cause of the aggregate (see
    /// [`source`](`std::error::Error::source`)). Nested aggregates in the list are flattened.
    ///
    /// Returns [`Error::EmptyErrorList`] if the list is empty.
    pub fn from_errors<I>(errors: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<RecordedError>,
    {
        let errors: Vec<RecordedError> = errors.into_iter().map(Into::into).collect();
        let Some(first) = errors.first().cloned() else {
            debug!("refusing to build an aggregate error from an empty list");
            return Err(Error::EmptyErrorList);
        };

        Ok(Self::from_parts(flatten(errors), Some(first)))
    }

    /// Wrap a single error as the chained cause
    ///
    /// The cause is not added to the recorded errors, the resulting aggregate reports zero errors.
    pub fn from_cause<E: Into<RecordedError>>(cause: E) -> Self {
        Self::from_parts(Vec::new(), Some(cause.into()))
    }

    /// Create an aggregate from a list of errors and an explicit chained cause
    ///
    /// The list is flattened with the same rule as [`from_errors`](`AggregateError::from_errors`),
    /// and may be empty.
    pub fn with_cause<I, C>(errors: I, cause: C) -> Self
    where
        I: IntoIterator,
        I::Item: Into<RecordedError>,
        C: Into<RecordedError>,
    {
        let errors = errors.into_iter().map(Into::into).collect();
        Self::from_parts(flatten(errors), Some(cause.into()))
    }

    /// Collect the results of a batch of operations
    ///
    /// Returns all the values if every operation succeeded, or an aggregate of every failure, in
    /// order, otherwise.
    ///
    /// ```rust
    /// use aggregate_error::AggregateError;
    ///
    /// let results: Vec<Result<u8, std::num::ParseIntError>> =
    ///     vec!["1".parse(), "x".parse(), "3".parse(), "y".parse()];
    ///
    /// let err = AggregateError::collect(results).unwrap_err();
    /// assert_eq!(err.len(), 2);
    /// ```
    pub fn collect<I, T, E>(results: I) -> std::result::Result<Vec<T>, Self>
    where
        I: IntoIterator<Item = std::result::Result<T, E>>,
        E: Into<RecordedError>,
    {
        let mut values = Vec::new();
        let mut failures: Vec<RecordedError> = Vec::new();
        for result in results {
            match result {
                Ok(value) => values.push(value),
                Err(err) => failures.push(err.into()),
            }
        }

        match failures.first().cloned() {
            None => Ok(values),
            Some(first) => Err(Self::from_parts(flatten(failures), Some(first))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RecordedError>> {
        // the list is never left half-updated, so a poisoned lock is still usable
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a snapshot of the recorded errors
    ///
    /// Changes to the returned list do not affect the aggregate.
    pub fn errors(&self) -> Vec<RecordedError> {
        self.lock().clone()
    }

    /// Record a new error
    ///
    /// The error is appended as is, nested aggregates are not flattened on this path.
    pub fn add_error<E: Into<RecordedError>>(&self, error: E) {
        let error = error.into();
        let total = {
            let mut errors = self.lock();
            errors.push(error);
            errors.len()
        };
        trace!(total, "error added to aggregate");
    }

    /// The number of recorded errors
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no errors have been recorded
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The chained cause of the aggregate, if any
    pub fn cause(&self) -> Option<&RecordedError> {
        self.cause.as_ref()
    }

    /// The backtrace captured when the aggregate was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Return `Ok(value)` if no errors were recorded, or the aggregate itself as the error
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Build the report of the recorded errors
    ///
    /// The report starts with a header line with the number of errors, followed by one line per
    /// error with the format `<index>. <type name>: <message>`. The message part is omitted if
    /// the error message is empty. Every line is terminated by
    /// [`LINE_SEPARATOR`](`crate::LINE_SEPARATOR`).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Write the stack trace of every recorded error to a text sink
    ///
    /// Each error trace is preceded by a `MultiException stack <index> of <total>` line. If no
    /// errors have been recorded, this writes the trace of the aggregate itself followed by its
    /// chained cause.
    pub fn fmt_stack_trace<W: fmt::Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        report::fmt_stack_trace(out, self)
    }

    /// Write the stack trace of every recorded error to a byte sink
    ///
    /// The bytes written are the UTF-8 encoding of [`fmt_stack_trace`](`AggregateError::fmt_stack_trace`).
    pub fn write_stack_trace<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        report::write_stack_trace(out, self)
    }

    /// Return the stack trace as a string
    pub fn stack_trace(&self) -> String {
        let mut trace = String::new();
        // writing to a String cannot fail
        let _ = self.fmt_stack_trace(&mut trace);
        trace
    }
}

impl Default for AggregateError {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Into<RecordedError>> TryFrom<Vec<E>> for AggregateError {
    type Error = Error;

    fn try_from(errors: Vec<E>) -> Result<Self> {
        Self::from_errors(errors)
    }
}

impl<E: Into<RecordedError>> Extend<E> for AggregateError {
    fn extend<T: IntoIterator<Item = E>>(&mut self, iter: T) {
        let errors = self
            .errors
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        errors.extend(iter.into_iter().map(Into::into));
        trace!(total = errors.len(), "errors added to aggregate");
    }
}

impl StdError for AggregateError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        report::fmt_message(f, &self.errors())
    }
}

impl fmt::Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateError")
            .field("errors", &self.errors())
            .field("cause", &self.cause)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::any::type_name;
    use thiserror::Error;

    use crate::LINE_SEPARATOR;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct ErrorA;

    #[derive(Debug)]
    struct ErrorB;

    impl Display for ErrorB {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            Ok(())
        }
    }

    impl StdError for ErrorB {}

    #[derive(Debug, Error, PartialEq)]
    #[error("error {0}")]
    struct Numbered(usize);

    fn numbers(aggregate: &AggregateError) -> Vec<usize> {
        aggregate
            .errors()
            .iter()
            .filter_map(|e| e.downcast_ref::<Numbered>().map(|n| n.0))
            .collect()
    }

    #[test]
    fn it_creates_an_empty_aggregate() {
        let aggregate = AggregateError::new();
        assert!(aggregate.is_empty());
        assert!(aggregate.cause().is_none());
        assert!(aggregate.source().is_none());
    }

    #[test]
    fn it_keeps_the_order_of_the_input_list() {
        let aggregate = AggregateError::from_errors((0..5).map(Numbered)).unwrap();
        assert_eq!(numbers(&aggregate), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn it_uses_the_first_error_as_cause() {
        let aggregate = AggregateError::from_errors([Numbered(7), Numbered(8)]).unwrap();
        let cause = aggregate.cause().unwrap();
        assert_eq!(cause.downcast_ref::<Numbered>(), Some(&Numbered(7)));
        assert_eq!(aggregate.source().unwrap().to_string(), "error 7");
    }

    #[test]
    fn it_rejects_an_empty_error_list() {
        let result = AggregateError::from_errors(Vec::<ErrorA>::new());
        assert_eq!(result.unwrap_err(), Error::EmptyErrorList);

        let result = AggregateError::try_from(Vec::<ErrorA>::new());
        assert!(result.is_err());
    }

    #[test]
    fn it_flattens_nested_aggregates_in_place() {
        let inner = AggregateError::from_errors([Numbered(1), Numbered(2)]).unwrap();
        let aggregate = AggregateError::from_errors([
            RecordedError::from(Numbered(0)),
            RecordedError::from(inner),
            RecordedError::from(Numbered(3)),
        ])
        .unwrap();

        assert_eq!(numbers(&aggregate), vec![0, 1, 2, 3]);
        assert!(aggregate
            .errors()
            .iter()
            .all(|e| !e.is::<AggregateError>()));
    }

    #[test]
    fn it_flattens_aggregates_wrapped_in_anyhow() {
        let inner = AggregateError::from_errors([Numbered(1), Numbered(2)]).unwrap();
        let aggregate = AggregateError::from_errors([
            RecordedError::from_anyhow(anyhow::Error::new(inner)),
            RecordedError::from(Numbered(3)),
        ])
        .unwrap();

        assert_eq!(numbers(&aggregate), vec![1, 2, 3]);

        let inner = AggregateError::from_errors([Numbered(4)]).unwrap();
        let aggregate = AggregateError::with_cause(
            [RecordedError::from_anyhow(anyhow::Error::new(inner))],
            ErrorA,
        );
        assert_eq!(numbers(&aggregate), vec![4]);
    }

    #[test]
    fn it_keeps_the_nested_aggregate_as_cause() {
        let inner = AggregateError::from_errors([Numbered(1)]).unwrap();
        let aggregate = AggregateError::from_errors([inner]).unwrap();

        assert!(aggregate.cause().unwrap().is::<AggregateError>());
        assert_eq!(numbers(&aggregate), vec![1]);
    }

    #[test]
    fn it_wraps_a_cause_without_recording_it() {
        let aggregate = AggregateError::from_cause(ErrorA);
        assert_eq!(aggregate.len(), 0);
        assert!(aggregate.cause().unwrap().is::<ErrorA>());
        assert_eq!(aggregate.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn it_flattens_and_keeps_plain_errors_with_an_explicit_cause() {
        let inner = AggregateError::from_errors([Numbered(1), Numbered(2)]).unwrap();
        let aggregate = AggregateError::with_cause(
            [RecordedError::from(Numbered(0)), RecordedError::from(inner)],
            ErrorA,
        );

        assert_eq!(numbers(&aggregate), vec![0, 1, 2]);
        assert!(aggregate.cause().unwrap().is::<ErrorA>());

        let aggregate = AggregateError::with_cause(Vec::<ErrorA>::new(), ErrorA);
        assert!(aggregate.is_empty());
        assert!(aggregate.cause().is_some());
    }

    #[test]
    fn it_returns_snapshots_of_the_errors() {
        let aggregate = AggregateError::from_errors([Numbered(0)]).unwrap();

        let mut snapshot = aggregate.errors();
        snapshot.push(RecordedError::from(Numbered(1)));
        snapshot.clear();

        assert_eq!(numbers(&aggregate), vec![0]);
    }

    #[test]
    fn it_appends_added_errors() {
        let aggregate = AggregateError::from_errors([Numbered(0)]).unwrap();
        aggregate.add_error(Numbered(1));
        aggregate.add_error(Numbered(1));

        // duplicates are allowed
        assert_eq!(numbers(&aggregate), vec![0, 1, 1]);
    }

    #[test]
    fn it_does_not_flatten_added_aggregates() {
        let aggregate = AggregateError::new();
        aggregate.add_error(AggregateError::from_errors([Numbered(0), Numbered(1)]).unwrap());

        assert_eq!(aggregate.len(), 1);
        assert!(aggregate.errors()[0].is::<AggregateError>());
    }

    #[test]
    fn it_extends_with_multiple_errors() {
        let mut aggregate = AggregateError::new();
        aggregate.extend((0..3).map(Numbered));
        assert_eq!(numbers(&aggregate), vec![0, 1, 2]);
    }

    #[test]
    fn it_reports_every_error_in_the_message() {
        let aggregate = AggregateError::from_errors([
            RecordedError::from(ErrorA),
            RecordedError::from(ErrorB),
        ])
        .unwrap();

        let errors = aggregate.errors();
        assert!(errors[0].is::<ErrorA>());
        assert!(errors[1].is::<ErrorB>());

        let ls = LINE_SEPARATOR;
        let expected = format!(
            "AggregateError has 2 errors. They are:{ls}1. {}: boom{ls}2. {}{ls}",
            type_name::<ErrorA>(),
            type_name::<ErrorB>()
        );
        assert_eq!(aggregate.message(), expected);
        assert_eq!(aggregate.to_string(), expected);
    }

    #[test]
    fn it_reports_zero_errors_when_empty() {
        assert_eq!(
            AggregateError::new().message(),
            format!("AggregateError has 0 errors. They are:{LINE_SEPARATOR}")
        );
    }

    #[test]
    fn it_converts_to_a_result() {
        let aggregate = AggregateError::new();
        assert_eq!(aggregate.into_result(42).unwrap(), 42);

        let aggregate = AggregateError::new();
        aggregate.add_error(ErrorA);
        assert_eq!(aggregate.into_result(42).unwrap_err().len(), 1);
    }

    #[test]
    fn it_collects_batch_results() {
        let ok: Vec<std::result::Result<usize, Numbered>> = vec![Ok(1), Ok(2)];
        assert_eq!(AggregateError::collect(ok).unwrap(), vec![1, 2]);

        let mixed = vec![Ok(0), Err(Numbered(1)), Ok(2), Err(Numbered(3))];
        let aggregate = AggregateError::collect(mixed).unwrap_err();
        assert_eq!(numbers(&aggregate), vec![1, 3]);
        assert!(aggregate.cause().unwrap().is::<Numbered>());
    }

    #[test]
    fn it_propagates_as_a_boxed_error() {
        fn run() -> std::result::Result<(), Box<dyn StdError + Send + Sync>> {
            Err(AggregateError::from_errors([ErrorA]).unwrap())?
        }

        let err = run().unwrap_err();
        assert!(err.downcast_ref::<AggregateError>().is_some());
    }
}
