//! Hand-driven requestors and result sinks for unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use tandem_core::{Callback, CancelHandle, CancelReason, RequestorError, SharedRequestor, shared};

struct ProbeState<I, O> {
    inputs: Vec<I>,
    callback: Option<Callback<O>>,
    cancels: Vec<CancelReason>,
}

/// A requestor the test completes by hand
pub(crate) struct Probe<I, O> {
    state: Rc<RefCell<ProbeState<I, O>>>,
}

impl<I: Clone + 'static, O: 'static> Probe<I, O> {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ProbeState {
                inputs: Vec::new(),
                callback: None,
                cancels: Vec::new(),
            })),
        }
    }

    pub(crate) fn requestor(&self) -> SharedRequestor<I, O> {
        let state = self.state.clone();
        shared(move |callback: Callback<O>, value: I| {
            {
                let mut probe = state.borrow_mut();
                probe.inputs.push(value);
                probe.callback = Some(callback);
            }
            let state = state.clone();
            Some(CancelHandle::new(move |reason| state.borrow_mut().cancels.push(reason)))
        })
    }

    pub(crate) fn started(&self) -> usize {
        self.state.borrow().inputs.len()
    }

    pub(crate) fn inputs(&self) -> Vec<I> {
        self.state.borrow().inputs.clone()
    }

    pub(crate) fn cancels(&self) -> Vec<CancelReason> {
        self.state.borrow().cancels.clone()
    }

    pub(crate) fn succeed(&self, value: O) {
        self.take_callback().succeed(value);
    }

    pub(crate) fn fail(&self, message: &str) {
        self.take_callback().fail(message);
    }

    fn take_callback(&self) -> Callback<O> {
        self.state.borrow_mut().callback.take().expect("probe has no pending callback")
    }
}

/// Every result delivered to a caller callback
pub(crate) type Outcomes<O> = Rc<RefCell<Vec<Result<O, RequestorError>>>>;

/// Callback that records into [`Outcomes`]
pub(crate) fn sink<O: 'static>() -> (Callback<O>, Outcomes<O>) {
    let outcomes: Outcomes<O> = Rc::new(RefCell::new(Vec::new()));
    let recorder = outcomes.clone();
    (Callback::new(move |result| recorder.borrow_mut().push(result)), outcomes)
}
