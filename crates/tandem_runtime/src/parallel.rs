//! Parallel combinator: required and optional requestors, positional results.
//!
//! Required requestors occupy indices `[0, required)` of the combined list,
//! optional ones follow. A required failure is fatal; an optional failure
//! just leaves its slot empty. When the run succeeds is governed by
//! [`Completion`].

use crate::coordinator::{Coordinator, Policy, Roster, RunConfig, settle};
use crate::host::Host;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_core::{
    Callback, CancelReason, ConfigResult, Factory, RequestorError, SharedRequestor, shared,
};
use tracing::debug;

/// When a parallel run may succeed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// As soon as every required requestor succeeded; pending optionals are cut off
    #[default]
    Required,
    /// Only once every requestor, required and optional, has completed
    All,
    /// Like `All` until the deadline; after it, like `Required` with no deadline
    Untimed,
}

impl From<Option<bool>> for Completion {
    fn from(option: Option<bool>) -> Self {
        match option {
            None => Self::Required,
            Some(true) => Self::All,
            Some(false) => Self::Untimed,
        }
    }
}

struct ParallelPolicy<O> {
    factory: Factory,
    callback: Option<Callback<Vec<Option<O>>>>,
    results: Vec<Option<O>>,
    required: usize,
    pending: usize,
    pending_required: usize,
    completion: Completion,
}

impl<O> ParallelPolicy<O> {
    fn new(factory: Factory, callback: Callback<Vec<Option<O>>>, count: usize, required: usize, completion: Completion) -> Self {
        Self {
            factory,
            callback: Some(callback),
            results: (0..count).map(|_| None).collect(),
            required,
            pending: count,
            pending_required: required,
            completion,
        }
    }

    fn succeed<I>(&mut self, run: &Coordinator<I, O>, reason: CancelReason) {
        run.cancel(reason);
        let results = std::mem::take(&mut self.results);
        debug!(factory = %self.factory, filled = results.iter().flatten().count(), "parallel settled");
        settle(&mut self.callback, Ok(results));
    }
}

impl<I, O> Policy<I, O> for ParallelPolicy<O> {
    fn on_complete(&mut self, run: &Coordinator<I, O>, index: usize, result: Result<O, RequestorError>) {
        self.pending -= 1;
        let is_required = index < self.required;
        if is_required {
            self.pending_required -= 1;
        }

        match result {
            Ok(value) => self.results[index] = Some(value),
            Err(error) if is_required => {
                debug!(factory = %self.factory, index, %error, "required requestor failed");
                run.cancel(CancelReason::Failure {
                    factory: self.factory,
                    error: Box::new(error.clone()),
                });
                settle(&mut self.callback, Err(error));
                return;
            }
            Err(_) => {}
        }

        let required_done = self.completion == Completion::Required && self.pending_required == 0;
        if self.pending == 0 || required_done {
            self.succeed(run, CancelReason::Optional { factory: self.factory });
        }
    }

    fn on_timeout(&mut self, run: &Coordinator<I, O>) {
        let budget = run.time_limit().unwrap_or_default();
        let reason = CancelReason::Timeout { factory: self.factory, budget };

        if self.completion == Completion::Untimed {
            // No further deadline; finish as soon as the requireds do
            self.completion = Completion::Required;
            if self.pending_required == 0 {
                self.succeed(run, reason);
            }
            return;
        }

        if self.pending_required == 0 {
            self.succeed(run, reason);
        } else {
            run.cancel(reason);
            settle(&mut self.callback, Err(RequestorError::Timeout { factory: self.factory, budget }));
        }
    }
}

/// Build a parallel requestor under the given factory name
pub(crate) fn gather<I, O>(
    factory: Factory,
    host: &Host,
    required: Vec<SharedRequestor<I, O>>,
    optional: Vec<SharedRequestor<I, O>>,
    config: RunConfig,
    completion: Completion,
) -> ConfigResult<SharedRequestor<I, Vec<Option<O>>>>
where
    I: Clone + 'static,
    O: 'static,
{
    let required_count = required.len();
    // With nothing required, every optional is waited for
    let completion = if required_count == 0 { Completion::All } else { completion };

    let mut requestors = required;
    requestors.extend(optional);
    let roster = Roster::new(factory, requestors, config)?;
    let host = host.clone();

    Ok(shared(move |callback: Callback<Vec<Option<O>>>, value: I| {
        let policy = ParallelPolicy::new(factory, callback, roster.len(), required_count, completion);
        Some(roster.start(&host, value, policy).cancel_handle())
    }))
}

/// Run required and optional requestors concurrently
///
/// The result holds one slot per requestor, required first; slots of
/// optionals that failed or were cut off stay `None`. Any required failure
/// is reported immediately.
///
/// On the deadline, `Required` and `All` cancel everything and succeed only
/// if every required requestor already succeeded. `Untimed` instead drops
/// the deadline and waits for the requireds.
///
/// # Errors
///
/// Returns error if both lists are empty or `throttle` is zero
pub fn parallel<I, O>(
    host: &Host,
    required: Vec<SharedRequestor<I, O>>,
    optional: Vec<SharedRequestor<I, O>>,
    time_limit: Option<Duration>,
    throttle: Option<usize>,
    completion: Completion,
) -> ConfigResult<SharedRequestor<I, Vec<Option<O>>>>
where
    I: Clone + 'static,
    O: 'static,
{
    let config = RunConfig::new().with_time_limit(time_limit).with_throttle(throttle);
    gather(Factory::Parallel, host, required, optional, config, completion)
}
