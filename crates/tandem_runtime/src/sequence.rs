//! Sequence combinator: one requestor at a time, each success feeding the next.
//!
//! ```text
//! sequence([r1, r2, r3])(v):
//!   v1 ← r1(v)    fail → report failure, r2 and r3 never start
//!   v2 ← r2(v1)
//!   v3 ← r3(v2)
//!   report v3
//! ```

use crate::coordinator::{Coordinator, Policy, Roster, RunConfig, settle};
use crate::host::Host;
use std::time::Duration;
use tandem_core::{
    Callback, CancelReason, ConfigResult, Factory, RequestorError, SharedRequestor, shared,
};
use tracing::debug;

struct SequencePolicy<V> {
    callback: Option<Callback<V>>,
    last: usize,
}

impl<V: Clone> Policy<V, V> for SequencePolicy<V> {
    fn on_complete(&mut self, run: &Coordinator<V, V>, index: usize, result: Result<V, RequestorError>) {
        match result {
            Err(error) => {
                debug!(factory = %Factory::Sequence, index, %error, "sequence step failed");
                run.cancel(CancelReason::Failure {
                    factory: Factory::Sequence,
                    error: Box::new(error.clone()),
                });
                settle(&mut self.callback, Err(error));
            }
            Ok(value) if index == self.last => {
                run.cancel(CancelReason::Settled { factory: Factory::Sequence });
                settle(&mut self.callback, Ok(value));
            }
            Ok(_) => {}
        }
    }

    fn on_timeout(&mut self, run: &Coordinator<V, V>) {
        let budget = run.time_limit().unwrap_or_default();
        run.cancel(CancelReason::Timeout { factory: Factory::Sequence, budget });
        settle(&mut self.callback, Err(RequestorError::Timeout { factory: Factory::Sequence, budget }));
    }

    fn thread(&self, previous: &V) -> Option<V> {
        Some(previous.clone())
    }
}

/// Run requestors one after another, threading each success into the next
///
/// The overall result is the last requestor's success. The first failure,
/// or the time budget elapsing, ends the sequence.
///
/// # Errors
///
/// Returns error if `requestors` is empty
pub fn sequence<V>(
    host: &Host,
    requestors: Vec<SharedRequestor<V, V>>,
    time_limit: Option<Duration>,
) -> ConfigResult<SharedRequestor<V, V>>
where
    V: Clone + 'static,
{
    let config = RunConfig::new().with_time_limit(time_limit).with_throttle(Some(1));
    let roster = Roster::new(Factory::Sequence, requestors, config)?;
    let host = host.clone();

    Ok(shared(move |callback: Callback<V>, value: V| {
        let policy = SequencePolicy {
            callback: Some(callback),
            last: roster.len() - 1,
        };
        Some(roster.start(&host, value, policy).cancel_handle())
    }))
}
