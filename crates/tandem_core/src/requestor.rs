//! The requestor contract.
//!
//! A requestor is started with a [`Callback`] and an input value. It must
//! eventually call the callback exactly once, with either a success or an
//! error, and may hand back a [`CancelHandle`] that asks outstanding work to
//! stop. Combinators consume requestors and produce requestors, so composed
//! trees look exactly like leaves to their callers.
//!
//! `Result` makes "exactly one of success or error" a type-level fact, and
//! because both callback and handle are `FnOnce`, neither can be invoked twice.

use crate::error::RequestorError;
use crate::reason::CancelReason;
use std::fmt;
use std::rc::Rc;

/// Single-use completion callback
pub struct Callback<O> {
    inner: Box<dyn FnOnce(Result<O, RequestorError>)>,
}

impl<O> Callback<O> {
    /// Wrap a closure as a callback
    pub fn new(f: impl FnOnce(Result<O, RequestorError>) + 'static) -> Self {
        Self { inner: Box::new(f) }
    }

    /// Report a result
    pub fn call(self, result: Result<O, RequestorError>) {
        (self.inner)(result);
    }

    /// Report a success
    pub fn succeed(self, value: O) {
        self.call(Ok(value));
    }

    /// Report a failure
    pub fn fail(self, error: impl Into<RequestorError>) {
        self.call(Err(error.into()));
    }
}

impl<O> fmt::Debug for Callback<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Best-effort request to stop outstanding work
///
/// Consumed when used. Coordinators invoke each handle at most once and
/// discard any panic it raises.
pub struct CancelHandle {
    inner: Box<dyn FnOnce(CancelReason)>,
}

impl CancelHandle {
    /// Wrap a closure as a cancel handle
    pub fn new(f: impl FnOnce(CancelReason) + 'static) -> Self {
        Self { inner: Box::new(f) }
    }

    /// Ask the work to stop for the given reason
    pub fn cancel(self, reason: CancelReason) {
        (self.inner)(reason);
    }

    /// Ask the work to stop with the generic reason
    pub fn cancel_default(self) {
        self.cancel(CancelReason::default());
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

/// An asynchronous unit of work that reports through a callback
pub trait Requestor<I, O> {
    /// Start the work
    ///
    /// The callback may fire later or, for immediate work, before this
    /// returns. Panicking here instead of using the callback is treated by
    /// coordinators as an ordinary failure report.
    fn start(&self, callback: Callback<O>, value: I) -> Option<CancelHandle>;
}

impl<I, O, F> Requestor<I, O> for F
where
    F: Fn(Callback<O>, I) -> Option<CancelHandle>,
{
    fn start(&self, callback: Callback<O>, value: I) -> Option<CancelHandle> {
        self(callback, value)
    }
}

/// Shared, type-erased requestor
pub type SharedRequestor<I, O> = Rc<dyn Requestor<I, O>>;

/// Erase a requestor into a [`SharedRequestor`]
pub fn shared<I, O, R>(requestor: R) -> SharedRequestor<I, O>
where
    R: Requestor<I, O> + 'static,
{
    Rc::new(requestor)
}
