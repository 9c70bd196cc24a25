//! Host event loop seam.
//!
//! Coordinators never run anything themselves: first launches are posted as
//! deferred tasks and deadlines are one-shot timers, both provided by the
//! host. [`LocalLoop`](crate::local::LocalLoop) drives them on a virtual clock;
//! [`TokioLoop`](crate::tokio_loop::TokioLoop) drives them on a tokio `LocalSet`.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Deferred unit of host work
pub type Task = Box<dyn FnOnce()>;

/// Identifies an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Single-threaded deferred execution and timers
pub trait EventLoop {
    /// Run `task` later, never from inside this call
    fn defer(&self, task: Task);

    /// Run `task` once after `delay`
    fn set_timer(&self, delay: Duration, task: Task) -> TimerId;

    /// Disarm a timer; unknown or already fired ids are ignored
    fn clear_timer(&self, id: TimerId);

    /// Time elapsed since the loop was created
    fn now(&self) -> Duration;
}

/// Cheap, clonable handle to an event loop
#[derive(Clone)]
pub struct Host {
    inner: Rc<dyn EventLoop>,
}

impl Host {
    /// Wrap an event loop
    pub fn new(event_loop: impl EventLoop + 'static) -> Self {
        Self { inner: Rc::new(event_loop) }
    }

    /// Run a closure later
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.inner.defer(Box::new(task));
    }

    /// Run a closure once after `delay`
    pub fn set_timer(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        self.inner.set_timer(delay, Box::new(task))
    }

    /// Disarm a timer
    pub fn clear_timer(&self, id: TimerId) {
        self.inner.clear_timer(id);
    }

    /// Current loop time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.now()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
