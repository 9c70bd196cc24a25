//! Race combinator: start everything, first success wins.
//!
//! ```text
//! race([r1, r2, ..., rn])(v):
//!   start each ri(v), at most `throttle` at a time
//!   first success → cancel the rest as losers, report it
//!   all failed    → report the last failure
//!   deadline      → cancel everything, report a timeout
//! ```
//!
//! Unlike a select-style race, failures do not win: only a success settles
//! the race early.

use crate::coordinator::{Coordinator, Policy, Roster, RunConfig, settle};
use crate::host::Host;
use std::time::Duration;
use tandem_core::{
    Callback, CancelReason, ConfigResult, Factory, RequestorError, SharedRequestor, shared,
};
use tracing::debug;

/// First-success policy shared by race and fallback
pub(crate) struct RacePolicy<O> {
    factory: Factory,
    callback: Option<Callback<O>>,
    pending: usize,
}

impl<O> RacePolicy<O> {
    pub(crate) fn new(factory: Factory, callback: Callback<O>, count: usize) -> Self {
        Self {
            factory,
            callback: Some(callback),
            pending: count,
        }
    }
}

impl<I, O> Policy<I, O> for RacePolicy<O> {
    fn on_complete(&mut self, run: &Coordinator<I, O>, index: usize, result: Result<O, RequestorError>) {
        self.pending -= 1;
        match result {
            Ok(value) => {
                debug!(factory = %self.factory, winner = index, "race won");
                run.cancel(CancelReason::Loser { factory: self.factory, winner: index });
                settle(&mut self.callback, Ok(value));
            }
            Err(error) if self.pending == 0 => {
                run.cancel(CancelReason::Failure {
                    factory: self.factory,
                    error: Box::new(error.clone()),
                });
                settle(&mut self.callback, Err(error));
            }
            Err(_) => {}
        }
    }

    fn on_timeout(&mut self, run: &Coordinator<I, O>) {
        let budget = run.time_limit().unwrap_or_default();
        run.cancel(CancelReason::Timeout { factory: self.factory, budget });
        settle(&mut self.callback, Err(RequestorError::Timeout { factory: self.factory, budget }));
    }
}

/// Build a first-success requestor under the given factory name
pub(crate) fn first_success<I, O>(
    factory: Factory,
    host: &Host,
    requestors: Vec<SharedRequestor<I, O>>,
    config: RunConfig,
) -> ConfigResult<SharedRequestor<I, O>>
where
    I: Clone + 'static,
    O: 'static,
{
    let roster = Roster::new(factory, requestors, config)?;
    let host = host.clone();

    Ok(shared(move |callback: Callback<O>, value: I| {
        let policy = RacePolicy::new(factory, callback, roster.len());
        Some(roster.start(&host, value, policy).cancel_handle())
    }))
}

/// Run requestors concurrently; the first success wins
///
/// Every requestor receives the same input. Outstanding losers are
/// cancelled with [`CancelReason::Loser`]. If all fail, the last failure
/// is reported.
///
/// # Errors
///
/// Returns error if `requestors` is empty or `throttle` is zero
pub fn race<I, O>(
    host: &Host,
    requestors: Vec<SharedRequestor<I, O>>,
    time_limit: Option<Duration>,
    throttle: Option<usize>,
) -> ConfigResult<SharedRequestor<I, O>>
where
    I: Clone + 'static,
    O: 'static,
{
    let config = RunConfig::new().with_time_limit(time_limit).with_throttle(throttle);
    first_success(Factory::Race, host, requestors, config)
}
