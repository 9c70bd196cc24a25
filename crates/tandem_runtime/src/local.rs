//! Deterministic single-threaded event loop.
//!
//! The loop is completely deterministic:
//! - No threads, no wall clock
//! - Deferred tasks run in FIFO order
//! - Timers fire in `(deadline, arm order)` order (BTreeMap for determinism)
//! - Virtual time only moves when the caller advances it

use crate::host::{EventLoop, Host, Task, TimerId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

#[derive(Default)]
struct LoopState {
    /// Current virtual time since loop creation
    now: Duration,
    /// Deferred tasks, oldest first
    tasks: VecDeque<Task>,
    /// Armed timers keyed by (deadline, id)
    timers: BTreeMap<(Duration, u64), Task>,
    /// Deadline of each armed timer, for clearing by id
    deadlines: HashMap<u64, Duration>,
    /// Next timer id
    next_id: u64,
}

/// Deterministic event loop with a virtual clock
///
/// Cloning yields another handle to the same loop.
#[derive(Clone, Default)]
pub struct LocalLoop {
    state: Rc<RefCell<LoopState>>,
}

impl LocalLoop {
    /// Create a new loop at time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host handle for combinators
    #[must_use]
    pub fn host(&self) -> Host {
        Host::new(self.clone())
    }

    /// Current virtual time
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of queued deferred tasks
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Number of armed timers
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Check if nothing is queued or armed
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.tasks.is_empty() && state.timers.is_empty()
    }

    /// Run deferred tasks and due timers until none remain at the current time
    ///
    /// Returns the number of tasks and timers run.
    pub fn run_until_idle(&self) -> usize {
        let mut steps = 0;
        while let Some(task) = self.next_due() {
            task();
            steps += 1;
        }
        steps
    }

    /// Move the clock forward by `delay`, firing every timer on the way
    pub fn advance(&self, delay: Duration) -> usize {
        let target = self.now().saturating_add(delay);
        let mut steps = self.run_until_idle();
        while let Some(deadline) = self.next_deadline().filter(|d| *d <= target) {
            self.state.borrow_mut().now = deadline;
            steps += self.run_until_idle();
        }
        self.state.borrow_mut().now = target;
        steps + self.run_until_idle()
    }

    /// Run until no tasks or timers remain, jumping the clock between timers
    pub fn run(&self) -> usize {
        let mut steps = self.run_until_idle();
        while let Some(deadline) = self.next_deadline() {
            {
                let mut state = self.state.borrow_mut();
                state.now = state.now.max(deadline);
            }
            steps += self.run_until_idle();
        }
        steps
    }

    /// Pop the next runnable task, deferred tasks first
    fn next_due(&self) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        if let Some(task) = state.tasks.pop_front() {
            return Some(task);
        }

        let now = state.now;
        let key = state.timers.keys().next().copied().filter(|(deadline, _)| *deadline <= now)?;
        state.deadlines.remove(&key.1);
        state.timers.remove(&key)
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.state.borrow().timers.keys().next().map(|(deadline, _)| *deadline)
    }
}

impl EventLoop for LocalLoop {
    fn defer(&self, task: Task) {
        self.state.borrow_mut().tasks.push_back(task);
    }

    fn set_timer(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;

        let deadline = state.now.saturating_add(delay);
        state.timers.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        TimerId::from_raw(id)
    }

    fn clear_timer(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        if let Some(deadline) = state.deadlines.remove(&id.as_u64()) {
            state.timers.remove(&(deadline, id.as_u64()));
        }
    }

    fn now(&self) -> Duration {
        self.state.borrow().now
    }
}
