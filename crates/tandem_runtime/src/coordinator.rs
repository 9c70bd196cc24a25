//! Scheduler core shared by every combinator.
//!
//! A [`Coordinator`] launches the requestors of a [`Roster`] under a throttle,
//! routes each completion to a [`Policy`], enforces an optional time budget,
//! and cancels whatever is still outstanding when told to. It never decides
//! the overall outcome itself; that is the policy's job.
//!
//! Invariants:
//! - Each requestor is launched at most once, in index order
//! - At most `throttle` requestors are outstanding at any time
//! - First launches are deferred to the host, so the caller always holds the
//!   cancel handle before any completion can arrive
//! - Once cancelled, no further launches or completions are routed
//! - A result reported from inside `start` is routed after `start` returns,
//!   so only panics raised by the requestor itself become failures

use crate::host::{Host, TimerId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;
use tandem_core::validate;
use tandem_core::{
    Callback, CancelHandle, CancelReason, ConfigResult, Factory, RequestorError, SharedRequestor,
};
use tracing::{debug, warn};

/// Time budget and concurrency limit for one coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Deadline for the whole run; `None` or zero means no deadline
    pub time_limit: Option<Duration>,
    /// Maximum requestors outstanding at once; `None` means all of them
    pub throttle: Option<usize>,
}

impl RunConfig {
    /// Create a config with no deadline and no throttle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time budget
    #[must_use]
    pub fn with_time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Set the throttle
    #[must_use]
    pub fn with_throttle(mut self, throttle: Option<usize>) -> Self {
        self.throttle = throttle;
        self
    }
}

/// Combinator-specific routing of completions and deadlines
pub trait Policy<I, O> {
    /// Called once per completed requestor, in completion order
    fn on_complete(&mut self, run: &Coordinator<I, O>, index: usize, result: Result<O, RequestorError>);

    /// Called once if the time budget elapses while still running
    fn on_timeout(&mut self, run: &Coordinator<I, O>);

    /// Input for the next launch after a success
    ///
    /// `None` re-supplies the initial value, so siblings never see each
    /// other's results. Value-threading policies return the success.
    fn thread(&self, _previous: &O) -> Option<I> {
        None
    }
}

/// Validated requestor list plus run limits, fixed at factory time
pub struct Roster<I, O> {
    factory: Factory,
    requestors: Rc<[SharedRequestor<I, O>]>,
    throttle: usize,
    time_limit: Option<Duration>,
}

impl<I, O> Roster<I, O> {
    /// Validate a requestor list and its limits
    ///
    /// # Errors
    ///
    /// Returns error if the list is empty or the throttle is zero
    pub fn new(factory: Factory, requestors: Vec<SharedRequestor<I, O>>, config: RunConfig) -> ConfigResult<Self> {
        validate::require_requestors(factory, requestors.len())?;
        let throttle = validate::resolve_throttle(factory, config.throttle, requestors.len())?;

        Ok(Self {
            factory,
            requestors: requestors.into(),
            throttle,
            time_limit: validate::effective_time_limit(config.time_limit),
        })
    }

    /// Factory this roster belongs to
    #[must_use]
    pub const fn factory(&self) -> Factory {
        self.factory
    }

    /// Number of requestors
    #[must_use]
    pub fn len(&self) -> usize {
        self.requestors.len()
    }

    /// Always false; empty rosters are rejected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requestors.is_empty()
    }

    /// Resolved concurrency limit
    #[must_use]
    pub const fn throttle(&self) -> usize {
        self.throttle
    }

    /// Effective time budget
    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }
}

impl<I, O> Clone for Roster<I, O> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory,
            requestors: self.requestors.clone(),
            throttle: self.throttle,
            time_limit: self.time_limit,
        }
    }
}

impl<I: Clone + 'static, O: 'static> Roster<I, O> {
    /// Start a coordinator over this roster
    ///
    /// Nothing is launched until the host runs its deferred tasks.
    pub fn start(&self, host: &Host, initial: I, policy: impl Policy<I, O> + 'static) -> Coordinator<I, O> {
        let coordinator = Coordinator {
            shared: Rc::new(Shared {
                host: host.clone(),
                roster: self.clone(),
                initial,
                policy: RefCell::new(Box::new(policy)),
                state: RefCell::new(State::new(self.len())),
            }),
        };

        if let Some(budget) = self.time_limit {
            let run = coordinator.clone();
            let id = host.set_timer(budget, move || run.on_timeout());
            coordinator.shared.state.borrow_mut().timer = Some(id);
            debug!(factory = %self.factory, ?budget, "timer armed");
        }

        for _ in 0..self.throttle {
            let run = coordinator.clone();
            host.defer(move || run.launch_next(None));
        }

        coordinator
    }
}

/// Lifecycle of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Launching and routing completions
    Running,
    /// Invoking outstanding cancel handles
    Canceling,
    /// Dead; every further call is a no-op
    Terminated,
}

/// Progress of one requestor's `start` call
enum Launch<O> {
    /// Inside `start`; a result reported now is held back
    Starting,
    /// Reported from inside `start`
    Reported(Result<O, RequestorError>),
    /// `start` returned; results are routed directly
    Returned,
}

/// Per-requestor cancellation slot
enum Slot {
    /// Not launched yet
    Pending,
    /// Inside `start`, handle not known yet
    Launching,
    /// Outstanding, with a cancel handle
    Active(CancelHandle),
    /// Outstanding, without a cancel handle
    Running,
    /// Completed, cancelled, or abandoned
    Cleared,
}

impl Slot {
    const fn is_outstanding(&self) -> bool {
        matches!(self, Self::Launching | Self::Active(_) | Self::Running)
    }
}

struct State {
    phase: Phase,
    slots: Vec<Slot>,
    /// Next index to launch
    cursor: usize,
    /// Requestors not yet completed
    pending: usize,
    timer: Option<TimerId>,
    /// Reason given to `cancel`, for handles that arrive late
    reason: Option<CancelReason>,
}

impl State {
    fn new(count: usize) -> Self {
        Self {
            phase: Phase::Running,
            slots: (0..count).map(|_| Slot::Pending).collect(),
            cursor: 0,
            pending: count,
            timer: None,
            reason: None,
        }
    }
}

struct Shared<I, O> {
    host: Host,
    roster: Roster<I, O>,
    initial: I,
    policy: RefCell<Box<dyn Policy<I, O>>>,
    state: RefCell<State>,
}

/// One running instance of a combinator
pub struct Coordinator<I, O> {
    shared: Rc<Shared<I, O>>,
}

impl<I, O> Clone for Coordinator<I, O> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<I, O> fmt::Debug for Coordinator<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Coordinator")
            .field("factory", &self.shared.roster.factory)
            .field("phase", &state.phase)
            .field("cursor", &state.cursor)
            .field("pending", &state.pending)
            .finish_non_exhaustive()
    }
}

impl<I, O> Coordinator<I, O> {
    /// Factory that started this coordinator
    #[must_use]
    pub fn factory(&self) -> Factory {
        self.shared.roster.factory
    }

    /// Number of requestors
    #[must_use]
    pub fn count(&self) -> usize {
        self.shared.roster.len()
    }

    /// Effective time budget
    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        self.shared.roster.time_limit
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    /// Check if still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Number of requestors launched so far
    #[must_use]
    pub fn launched(&self) -> usize {
        self.shared.state.borrow().cursor
    }

    /// Number of requestors not yet completed
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.borrow().pending
    }

    /// Number of launched requestors still outstanding
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.state.borrow().slots.iter().filter(|slot| slot.is_outstanding()).count()
    }

    /// Stop the run
    ///
    /// Idempotent. Clears the timer, hands `reason` to every outstanding
    /// cancel handle (discarding any panic), and terminates.
    pub fn cancel(&self, reason: CancelReason) {
        let (timer, handles) = {
            let mut state = self.shared.state.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.phase = Phase::Canceling;
            state.reason = Some(reason.clone());

            let mut handles = Vec::new();
            for (index, slot) in state.slots.iter_mut().enumerate() {
                match std::mem::replace(slot, Slot::Cleared) {
                    Slot::Active(handle) => handles.push((index, handle)),
                    // Handle still unknown; `record_handle` cancels it on arrival
                    Slot::Launching => *slot = Slot::Launching,
                    Slot::Pending => *slot = Slot::Pending,
                    Slot::Running | Slot::Cleared => {}
                }
            }
            (state.timer.take(), handles)
        };

        debug!(factory = %self.factory(), %reason, outstanding = handles.len(), "cancelling");
        if let Some(id) = timer {
            self.shared.host.clear_timer(id);
        }
        for (index, handle) in handles {
            cancel_quietly(self.factory(), index, handle, reason.clone());
        }

        self.shared.state.borrow_mut().phase = Phase::Terminated;
    }

    /// Cancel handle that stops this coordinator
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle
    where
        I: 'static,
        O: 'static,
    {
        let run = self.clone();
        CancelHandle::new(move |reason| run.cancel(reason))
    }

    /// Store the handle returned by a requestor that started without reporting
    fn record_handle(&self, index: usize, handle: Option<CancelHandle>) {
        let late = {
            let mut state = self.shared.state.borrow_mut();
            if state.phase == Phase::Running {
                state.slots[index] = handle.map_or(Slot::Running, Slot::Active);
                return;
            }
            state.slots[index] = Slot::Cleared;
            handle.zip(state.reason.clone())
        };

        if let Some((handle, reason)) = late {
            cancel_quietly(self.factory(), index, handle, reason);
        }
    }
}

impl<I: Clone + 'static, O: 'static> Coordinator<I, O> {
    /// Launch the next pending requestor, if any
    ///
    /// `value` is the threaded input; `None` re-supplies the initial value.
    fn launch_next(&self, value: Option<I>) {
        let index = {
            let mut state = self.shared.state.borrow_mut();
            if state.phase != Phase::Running || state.cursor >= state.slots.len() {
                return;
            }
            let index = state.cursor;
            state.cursor += 1;
            state.slots[index] = Slot::Launching;
            index
        };

        let factory = self.factory();
        let requestor = self.shared.roster.requestors[index].clone();
        let value = value.unwrap_or_else(|| self.shared.initial.clone());
        let launch = Rc::new(RefCell::new(Launch::Starting));
        let run = self.clone();
        let held = launch.clone();
        let callback = Callback::new(move |result| {
            {
                let mut launch = held.borrow_mut();
                if matches!(*launch, Launch::Starting) {
                    *launch = Launch::Reported(result);
                    return;
                }
            }
            run.complete(index, result);
        });

        debug!(%factory, index, "launching requestor");
        let started = panic::catch_unwind(AssertUnwindSafe(|| requestor.start(callback, value)));
        let reported = match std::mem::replace(&mut *launch.borrow_mut(), Launch::Returned) {
            Launch::Reported(result) => Some(result),
            Launch::Starting | Launch::Returned => None,
        };

        // Completions run outside the unwind guard so caller panics propagate
        match (started, reported) {
            (Ok(_), Some(result)) => self.complete(index, result),
            (Err(payload), Some(result)) => {
                warn!(%factory, index, message = %panic_message(payload.as_ref()), "requestor panicked after reporting");
                self.complete(index, result);
            }
            (Ok(handle), None) => self.record_handle(index, handle),
            (Err(payload), None) => {
                let message = panic_message(payload.as_ref());
                warn!(%factory, index, %message, "requestor panicked on start");
                self.complete(index, Err(RequestorError::Panicked { index, message }));
            }
        }
    }

    /// Route one completion, then launch one more requestor
    fn complete(&self, index: usize, result: Result<O, RequestorError>) {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.phase != Phase::Running {
                // A launch cut short by cancel has no handle to give back
                if matches!(state.slots[index], Slot::Launching) {
                    state.slots[index] = Slot::Cleared;
                }
                return;
            }
            if !state.slots[index].is_outstanding() {
                return;
            }
            state.slots[index] = Slot::Cleared;
            state.pending -= 1;
        }

        debug!(factory = %self.factory(), index, ok = result.is_ok(), "requestor completed");
        let next = match &result {
            Ok(value) => self.shared.policy.borrow().thread(value),
            Err(_) => None,
        };
        self.shared.policy.borrow_mut().on_complete(self, index, result);
        self.launch_next(next);
    }

    fn on_timeout(&self) {
        {
            let mut state = self.shared.state.borrow_mut();
            state.timer = None;
            if state.phase != Phase::Running {
                return;
            }
        }

        debug!(factory = %self.factory(), "time limit elapsed");
        self.shared.policy.borrow_mut().on_timeout(self);
    }
}

/// Invoke a cancel handle, discarding any panic it raises
fn cancel_quietly(factory: Factory, index: usize, handle: CancelHandle, reason: CancelReason) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || handle.cancel(reason)));
    if let Err(payload) = outcome {
        warn!(%factory, index, message = %panic_message(payload.as_ref()), "cancel handle panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deliver a result through a stored caller callback, at most once
pub(crate) fn settle<O>(callback: &mut Option<Callback<O>>, result: Result<O, RequestorError>) {
    if let Some(callback) = callback.take() {
        callback.call(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf;
    use crate::local::LocalLoop;
    use crate::testing::Probe;
    use proptest::prelude::*;
    use std::cell::Cell;
    use tandem_core::{ConfigError, shared};

    type Events = Rc<RefCell<Vec<(usize, Result<i32, RequestorError>)>>>;

    /// Records completions; cancels on demand
    struct Recorder {
        events: Events,
        timeouts: Rc<Cell<usize>>,
        cancel_after: Option<usize>,
    }

    impl Recorder {
        fn new() -> (Self, Events, Rc<Cell<usize>>) {
            let events = Events::default();
            let timeouts = Rc::new(Cell::new(0));
            let recorder = Self {
                events: events.clone(),
                timeouts: timeouts.clone(),
                cancel_after: None,
            };
            (recorder, events, timeouts)
        }
    }

    impl Policy<i32, i32> for Recorder {
        fn on_complete(&mut self, run: &Coordinator<i32, i32>, index: usize, result: Result<i32, RequestorError>) {
            self.events.borrow_mut().push((index, result));
            if self.cancel_after == Some(self.events.borrow().len()) {
                run.cancel(CancelReason::Settled { factory: run.factory() });
            }
        }

        fn on_timeout(&mut self, run: &Coordinator<i32, i32>) {
            self.timeouts.set(self.timeouts.get() + 1);
            run.cancel(CancelReason::Timeout {
                factory: run.factory(),
                budget: run.time_limit().unwrap_or_default(),
            });
        }
    }

    fn roster(requestors: Vec<SharedRequestor<i32, i32>>, config: RunConfig) -> Roster<i32, i32> {
        Roster::new(Factory::Parallel, requestors, config).unwrap()
    }

    #[test]
    fn test_roster_rejects_empty() {
        let result: ConfigResult<Roster<i32, i32>> = Roster::new(Factory::Race, Vec::new(), RunConfig::new());
        assert_eq!(result.err(), Some(ConfigError::Empty { factory: Factory::Race }));
    }

    #[test]
    fn test_roster_rejects_zero_throttle() {
        let probe = Probe::<i32, i32>::new();
        let result = Roster::new(
            Factory::Race,
            vec![probe.requestor()],
            RunConfig::new().with_throttle(Some(0)),
        );
        assert_eq!(result.err(), Some(ConfigError::ZeroThrottle { factory: Factory::Race }));
    }

    #[test]
    fn test_roster_clamps_throttle_and_ignores_zero_budget() {
        let probe = Probe::<i32, i32>::new();
        let roster = roster(
            vec![probe.requestor(), probe.requestor()],
            RunConfig::new().with_throttle(Some(10)).with_time_limit(Some(Duration::ZERO)),
        );
        assert_eq!(roster.throttle(), 2);
        assert_eq!(roster.time_limit(), None);
    }

    #[test]
    fn test_first_launch_is_deferred() {
        let event_loop = LocalLoop::new();
        let probe = Probe::new();
        let (recorder, _, _) = Recorder::new();

        let run = roster(vec![probe.requestor()], RunConfig::new()).start(&event_loop.host(), 5, recorder);
        assert_eq!(probe.started(), 0);
        assert_eq!(run.launched(), 0);

        event_loop.run_until_idle();
        assert_eq!(probe.started(), 1);
        assert_eq!(probe.inputs(), vec![5]);
    }

    #[test]
    fn test_completion_routes_and_launches_next() {
        let event_loop = LocalLoop::new();
        let a = Probe::new();
        let b = Probe::new();
        let (recorder, events, _) = Recorder::new();

        let run = roster(vec![a.requestor(), b.requestor()], RunConfig::new().with_throttle(Some(1)))
            .start(&event_loop.host(), 1, recorder);
        event_loop.run_until_idle();
        assert_eq!((a.started(), b.started()), (1, 0));

        a.succeed(10);
        assert_eq!(b.started(), 1);
        // Fan-out policy: the sibling sees the initial value, not 10
        assert_eq!(b.inputs(), vec![1]);

        b.fail("bad");
        assert_eq!(
            *events.borrow(),
            vec![(0, Ok(10)), (1, Err(RequestorError::failed("bad")))]
        );
        assert_eq!(run.pending(), 0);
        assert_eq!(run.active_count(), 0);
    }

    #[test]
    fn test_cancel_only_outstanding() {
        let event_loop = LocalLoop::new();
        let probes: Vec<Probe<i32, i32>> = (0..4).map(|_| Probe::new()).collect();
        let (recorder, _, _) = Recorder::new();

        let run = roster(
            probes.iter().map(Probe::requestor).collect(),
            RunConfig::new().with_throttle(Some(2)),
        )
        .start(&event_loop.host(), 0, recorder);
        event_loop.run_until_idle();

        probes[0].succeed(1);
        // 1 and 2 outstanding, 3 never launched
        run.cancel(CancelReason::Cancel);

        assert!(probes[0].cancels().is_empty());
        assert_eq!(probes[1].cancels(), vec![CancelReason::Cancel]);
        assert_eq!(probes[2].cancels(), vec![CancelReason::Cancel]);
        assert_eq!(probes[3].started(), 0);
        assert!(probes[3].cancels().is_empty());
        assert_eq!(run.phase(), Phase::Terminated);
    }

    #[test]
    fn test_cancel_is_idempotent_and_silences_late_completions() {
        let event_loop = LocalLoop::new();
        let probe = Probe::new();
        let (recorder, events, _) = Recorder::new();

        let run = roster(vec![probe.requestor()], RunConfig::new()).start(&event_loop.host(), 0, recorder);
        event_loop.run_until_idle();

        run.cancel(CancelReason::Cancel);
        run.cancel(CancelReason::Cancel);
        assert_eq!(probe.cancels().len(), 1);

        probe.succeed(3);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_cancel_before_launch_launches_nothing() {
        let event_loop = LocalLoop::new();
        let probe = Probe::new();
        let (recorder, _, _) = Recorder::new();

        let run = roster(vec![probe.requestor()], RunConfig::new()).start(&event_loop.host(), 0, recorder);
        run.cancel_handle().cancel_default();
        event_loop.run_until_idle();

        assert_eq!(probe.started(), 0);
        assert!(probe.cancels().is_empty());
    }

    #[test]
    fn test_panicking_requestor_is_a_failure() {
        let event_loop = LocalLoop::new();
        let after = Probe::new();
        let (recorder, events, _) = Recorder::new();
        let exploding = shared(|_callback: Callback<i32>, _value: i32| -> Option<CancelHandle> {
            panic!("kaboom");
        });

        let _run = roster(vec![exploding, after.requestor()], RunConfig::new().with_throttle(Some(1)))
            .start(&event_loop.host(), 0, recorder);
        event_loop.run_until_idle();

        assert_eq!(
            *events.borrow(),
            vec![(0, Err(RequestorError::Panicked { index: 0, message: "kaboom".to_string() }))]
        );
        assert_eq!(after.started(), 1);
    }

    #[test]
    fn test_panic_after_reporting_is_not_reported_twice() {
        let event_loop = LocalLoop::new();
        let (recorder, events, _) = Recorder::new();
        let report_then_panic = shared(|callback: Callback<i32>, value: i32| -> Option<CancelHandle> {
            callback.succeed(value);
            panic!("late");
        });

        let _run = roster(vec![report_then_panic], RunConfig::new()).start(&event_loop.host(), 4, recorder);
        event_loop.run_until_idle();

        assert_eq!(*events.borrow(), vec![(0, Ok(4))]);
    }

    #[test]
    fn test_panicking_cancel_handle_is_swallowed() {
        let event_loop = LocalLoop::new();
        let other = Probe::new();
        let (recorder, _, _) = Recorder::new();
        let bad_handle = shared(|_callback: Callback<i32>, _value: i32| {
            Some(CancelHandle::new(|_| panic!("cannot stop")))
        });

        let run = roster(vec![bad_handle, other.requestor()], RunConfig::new())
            .start(&event_loop.host(), 0, recorder);
        event_loop.run_until_idle();

        run.cancel(CancelReason::Cancel);
        assert_eq!(other.cancels(), vec![CancelReason::Cancel]);
        assert_eq!(run.phase(), Phase::Terminated);
    }

    #[test]
    fn test_synchronous_completion_does_not_record_handle() {
        let event_loop = LocalLoop::new();
        let cancelled = Rc::new(Cell::new(false));
        let flag = cancelled.clone();
        let (recorder, events, _) = Recorder::new();
        let immediate = shared(move |callback: Callback<i32>, value: i32| {
            callback.succeed(value + 1);
            let flag = flag.clone();
            Some(CancelHandle::new(move |_| flag.set(true)))
        });
        let slow = Probe::new();

        let run = roster(vec![immediate, slow.requestor()], RunConfig::new())
            .start(&event_loop.host(), 1, recorder);
        event_loop.run_until_idle();
        run.cancel(CancelReason::Cancel);

        assert_eq!(*events.borrow(), vec![(0, Ok(2))]);
        assert!(!cancelled.get());
        assert_eq!(slow.cancels().len(), 1);
    }

    #[test]
    fn test_handle_arriving_after_cancel_is_cancelled() {
        let event_loop = LocalLoop::new();
        let this_run: Rc<RefCell<Option<Coordinator<i32, i32>>>> = Rc::default();
        let received = Rc::new(RefCell::new(Vec::new()));
        let (recorder, _, _) = Recorder::new();

        let run_slot = this_run.clone();
        let sink = received.clone();
        let cancels_own_run = shared(move |_callback: Callback<i32>, _value: i32| {
            if let Some(run) = run_slot.borrow().as_ref() {
                run.cancel(CancelReason::Cancel);
            }
            let sink = sink.clone();
            Some(CancelHandle::new(move |reason| sink.borrow_mut().push(reason)))
        });

        let run = roster(vec![cancels_own_run], RunConfig::new()).start(&event_loop.host(), 0, recorder);
        *this_run.borrow_mut() = Some(run.clone());
        event_loop.run_until_idle();

        assert_eq!(*received.borrow(), vec![CancelReason::Cancel]);
        assert_eq!(run.phase(), Phase::Terminated);
        this_run.borrow_mut().take();
    }

    #[test]
    fn test_panic_after_cancelling_own_run_clears_slot() {
        let event_loop = LocalLoop::new();
        let this_run: Rc<RefCell<Option<Coordinator<i32, i32>>>> = Rc::default();
        let (recorder, events, _) = Recorder::new();

        let run_slot = this_run.clone();
        let cancel_then_panic = shared(move |_callback: Callback<i32>, _value: i32| -> Option<CancelHandle> {
            if let Some(run) = run_slot.borrow().as_ref() {
                run.cancel(CancelReason::Cancel);
            }
            panic!("gave up");
        });

        let run = roster(vec![cancel_then_panic], RunConfig::new()).start(&event_loop.host(), 0, recorder);
        *this_run.borrow_mut() = Some(run.clone());
        event_loop.run_until_idle();

        assert_eq!(run.phase(), Phase::Terminated);
        assert_eq!(run.active_count(), 0);
        assert!(events.borrow().is_empty());
        this_run.borrow_mut().take();
    }

    #[test]
    fn test_timeout_fires_once_and_cancels() {
        let event_loop = LocalLoop::new();
        let probe = Probe::new();
        let (recorder, _, timeouts) = Recorder::new();

        let run = roster(
            vec![probe.requestor()],
            RunConfig::new().with_time_limit(Some(Duration::from_millis(50))),
        )
        .start(&event_loop.host(), 0, recorder);

        event_loop.advance(Duration::from_millis(49));
        assert_eq!(timeouts.get(), 0);
        event_loop.advance(Duration::from_millis(1));
        assert_eq!(timeouts.get(), 1);

        assert_eq!(
            probe.cancels(),
            vec![CancelReason::Timeout { factory: Factory::Parallel, budget: Duration::from_millis(50) }]
        );
        assert_eq!(run.phase(), Phase::Terminated);
        event_loop.run();
        assert_eq!(timeouts.get(), 1);
    }

    #[test]
    fn test_cancel_clears_timer() {
        let event_loop = LocalLoop::new();
        let probe = Probe::new();
        let (mut recorder, _, timeouts) = Recorder::new();
        recorder.cancel_after = Some(1);

        let _run = roster(
            vec![probe.requestor()],
            RunConfig::new().with_time_limit(Some(Duration::from_millis(50))),
        )
        .start(&event_loop.host(), 0, recorder);
        event_loop.run_until_idle();
        assert_eq!(event_loop.pending_timers(), 1);

        probe.succeed(1);
        assert_eq!(event_loop.pending_timers(), 0);
        event_loop.run();
        assert_eq!(timeouts.get(), 0);
    }

    proptest! {
        #[test]
        fn prop_throttle_bounds_outstanding(
            delays in proptest::collection::vec(1u64..50, 1..12),
            throttle in 1usize..5,
        ) {
            let event_loop = LocalLoop::new();
            let host = event_loop.host();
            let outstanding = Rc::new(Cell::new(0usize));
            let peak = Rc::new(Cell::new(0usize));
            let order = Rc::new(RefCell::new(Vec::new()));

            let requestors: Vec<SharedRequestor<i32, i32>> = delays
                .iter()
                .enumerate()
                .map(|(index, delay)| {
                    let inner = leaf::succeed_after(&host, Duration::from_millis(*delay), index as i32);
                    let outstanding = outstanding.clone();
                    let peak = peak.clone();
                    let order = order.clone();
                    shared(move |callback: Callback<i32>, value: i32| {
                        outstanding.set(outstanding.get() + 1);
                        peak.set(peak.get().max(outstanding.get()));
                        order.borrow_mut().push(index);
                        let outstanding = outstanding.clone();
                        inner.start(
                            Callback::new(move |result| {
                                outstanding.set(outstanding.get() - 1);
                                callback.call(result);
                            }),
                            value,
                        )
                    })
                })
                .collect();

            let (recorder, events, _) = Recorder::new();
            let run = roster(requestors, RunConfig::new().with_throttle(Some(throttle)))
                .start(&host, 0, recorder);
            event_loop.run();

            prop_assert!(peak.get() <= throttle);
            prop_assert_eq!(events.borrow().len(), delays.len());
            prop_assert_eq!(run.launched(), delays.len());
            let launched = order.borrow().clone();
            prop_assert_eq!(launched, (0..delays.len()).collect::<Vec<_>>());
        }
    }
}
