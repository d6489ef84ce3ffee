use std::{any::Any, error::Error, fmt};

use thiserror::Error;

/// Failure type a producer can report through a future.
///
/// Every `Error + Clone + Send + Sync + 'static` type is an `Exception`: the
/// store keeps its own copy and hands a fresh clone to every consumer.
pub trait Exception: Error + Send + Sync + 'static {
    /// Clone into a new box
    fn clone_exception(&self) -> Box<dyn Exception>;

    /// Access to the concrete type, used for downcasting
    fn as_any(&self) -> &dyn Any;
}

impl<E: Error + Clone + Send + Sync + 'static> Exception for E {
    fn clone_exception(&self) -> Box<dyn Exception> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Failure observed by a consumer of a future
#[derive(Debug, Error)]
pub enum FutureError {
    /// The producer reported this failure
    #[error("{0}")]
    Exception(Box<dyn Exception>),
    /// The producer failed in a way that was not reported as an `Exception`
    #[error("unhandled exception: {0}")]
    Unhandled(String),
    /// The computation ended without producing this result
    #[error("result {0} is not available")]
    ResultUnavailable(usize),
}

impl FutureError {
    /// The reported failure, if it is of type `E`
    pub fn downcast_ref<E: Exception>(&self) -> Option<&E> {
        match self {
            FutureError::Exception(e) => e.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Whether this failure came from the producer rather than a missing result
    pub fn is_exception(&self) -> bool {
        !matches!(self, FutureError::ResultUnavailable(_))
    }
}

impl Clone for FutureError {
    fn clone(&self) -> Self {
        match self {
            FutureError::Exception(e) => FutureError::Exception(e.clone_exception()),
            FutureError::Unhandled(msg) => FutureError::Unhandled(msg.clone()),
            FutureError::ResultUnavailable(index) => FutureError::ResultUnavailable(*index),
        }
    }
}

/* What the exception store holds */
enum Stored {
    Reported(Box<dyn Exception>),
    Unhandled(String),
}

impl fmt::Debug for Stored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stored::Reported(e) => write!(f, "Reported({})", e),
            Stored::Unhandled(msg) => write!(f, "Unhandled({})", msg),
        }
    }
}

/// Single-slot holder for the first failure of a computation.
///
/// Raising does not consume the stored failure: every call of
/// [`ExceptionStore::throw_if_present`] yields an independent clone.
#[derive(Debug, Default)]
pub struct ExceptionStore(Option<Stored>);

impl ExceptionStore {
    /// Store a clone of `e` unless a failure is already stored.
    ///
    /// Returns whether the failure was stored.
    pub fn set_exception(&mut self, e: &dyn Exception) -> bool {
        self.store(|| Stored::Reported(e.clone_exception()))
    }

    /// Store a failure that is not an `Exception` unless one is already stored
    pub fn set_unhandled(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.store(|| Stored::Unhandled(message))
    }

    /// Store a panic payload as an unhandled failure
    pub fn set_panic(&mut self, payload: &(dyn Any + Send)) -> bool {
        self.set_unhandled(panic_message(payload))
    }

    fn store(&mut self, stored: impl FnOnce() -> Stored) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.0 = Some(stored());
        true
    }

    /// Whether a failure is stored
    pub fn has_exception(&self) -> bool {
        self.0.is_some()
    }

    /// Raise a clone of the stored failure, if any
    pub fn throw_if_present(&self) -> Result<(), FutureError> {
        match &self.0 {
            None => Ok(()),
            Some(Stored::Reported(e)) => Err(FutureError::Exception(e.clone_exception())),
            Some(Stored::Unhandled(msg)) => Err(FutureError::Unhandled(msg.clone())),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.0 = None;
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}
