//! Event loop backed by a tokio `LocalSet`.
//!
//! Tasks and timers are spawned with `spawn_local`, so every method must be
//! called from inside a `LocalSet` (for example within `LocalSet::run_until`).

use crate::host::{EventLoop, Host, Task, TimerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Tokio-driven event loop
#[derive(Clone)]
pub struct TokioLoop {
    /// Creation instant, the zero of `now`
    origin: Instant,
    /// Spawned timer tasks, for abort on clear
    timers: Rc<RefCell<HashMap<u64, JoinHandle<()>>>>,
    /// Next timer id
    next_id: Rc<Cell<u64>>,
}

impl TokioLoop {
    /// Create a new loop
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timers: Rc::default(),
            next_id: Rc::default(),
        }
    }

    /// Host handle for combinators
    #[must_use]
    pub fn host(&self) -> Host {
        Host::new(self.clone())
    }

    /// Number of armed timers
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Default for TokioLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for TokioLoop {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }

    fn set_timer(&self, delay: Duration, task: Task) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let timers = self.timers.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            timers.borrow_mut().remove(&id);
            task();
        });
        self.timers.borrow_mut().insert(id, handle);
        TimerId::from_raw(id)
    }

    fn clear_timer(&self, id: TimerId) {
        let handle = self.timers.borrow_mut().remove(&id.as_u64());
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
