use std::{
    backtrace::Backtrace,
    error::Error as StdError,
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

#[doc(hidden)]
pub type BoxError = Box<dyn StdError + Send + Sync>;

enum Value {
    Boxed(BoxError),
    // kept whole so downcasts reach the error wrapped by anyhow
    Anyhow(anyhow::Error),
}

impl Deref for Value {
    type Target = dyn StdError + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        match self {
            Value::Boxed(error) => &**error,
            Value::Anyhow(error) => &**error,
        }
    }
}

struct Inner {
    type_name: &'static str,
    error: Value,
    backtrace: Backtrace,
}

/// A shared handle to a previously raised error
///
/// A `RecordedError` remembers the concrete type name of the error it was created from and a
/// [`Backtrace`] captured at conversion time. Capture follows the standard `RUST_BACKTRACE` and
/// `RUST_LIB_BACKTRACE` environment variables, so it is disabled by default.
///
/// Cloning a `RecordedError` is cheap, clones point to the same underlying error value.
///
/// # Example
///
/// ```rust
/// use aggregate_error::RecordedError;
///
/// let err = RecordedError::from(std::fmt::Error);
/// assert_eq!(err.type_name(), std::any::type_name::<std::fmt::Error>());
/// assert!(err.is::<std::fmt::Error>());
/// ```
#[derive(Clone)]
pub struct RecordedError(Arc<Inner>);

impl RecordedError {
    fn with_type_name(type_name: &'static str, error: Value) -> Self {
        Self(Arc::new(Inner {
            type_name,
            error,
            backtrace: Backtrace::capture(),
        }))
    }

    /// Record an error value
    pub fn new<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::with_type_name(std::any::type_name::<E>(), Value::Boxed(Box::new(error)))
    }

    /// Record an already boxed error
    ///
    /// The concrete type is erased at this point, so the recorded type name is the name of the
    /// box type.
    pub fn from_boxed(error: BoxError) -> Self {
        Self::with_type_name(std::any::type_name::<BoxError>(), Value::Boxed(error))
    }

    /// Record an [`anyhow::Error`]
    ///
    /// [`is`](`RecordedError::is`) and [`downcast_ref`](`RecordedError::downcast_ref`) look through
    /// the `anyhow::Error` into the error it wraps.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::with_type_name(std::any::type_name::<anyhow::Error>(), Value::Anyhow(error))
    }

    /// The type name of the recorded error
    ///
    /// This is the full path given by [`std::any::type_name`], e.g.
    /// `aggregate_error::aggregate::AggregateError` for an aggregate.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    /// The message of the recorded error
    ///
    /// An empty string means the error carries no message.
    pub fn message(&self) -> String {
        (*self.0.error).to_string()
    }

    /// The backtrace captured when the error was recorded
    pub fn backtrace(&self) -> &Backtrace {
        &self.0.backtrace
    }

    /// Returns true if the recorded error is of type `T`
    pub fn is<T: StdError + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Returns a reference to the recorded error if it is of type `T`
    pub fn downcast_ref<T: StdError + Send + Sync + 'static>(&self) -> Option<&T> {
        match &self.0.error {
            Value::Boxed(error) => error.downcast_ref::<T>(),
            Value::Anyhow(error) => error.downcast_ref::<T>(),
        }
    }

    /// Returns true if both handles point to the same recorded error
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl<E> From<E> for RecordedError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl Deref for RecordedError {
    type Target = dyn StdError + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        &*self.0.error
    }
}

impl AsRef<dyn StdError + Send + Sync + 'static> for RecordedError {
    fn as_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0.error
    }
}

impl Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.0.error, f)
    }
}

impl fmt::Debug for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.error {
            Value::Boxed(error) => fmt::Debug::fmt(error, f),
            Value::Anyhow(error) => fmt::Debug::fmt(error, f),
        }
    }
}
