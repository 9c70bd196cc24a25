//! Fallback combinator: try requestors one at a time until one succeeds.
//!
//! A race with a throttle of one. Every attempt receives the original
//! input; failures only move on to the next attempt.

use crate::coordinator::RunConfig;
use crate::host::Host;
use crate::race::first_success;
use std::time::Duration;
use tandem_core::{ConfigResult, Factory, SharedRequestor};

/// Try requestors in order, reporting the first success
///
/// If every attempt fails, the last failure is reported.
///
/// # Errors
///
/// Returns error if `requestors` is empty
pub fn fallback<I, O>(
    host: &Host,
    requestors: Vec<SharedRequestor<I, O>>,
    time_limit: Option<Duration>,
) -> ConfigResult<SharedRequestor<I, O>>
where
    I: Clone + 'static,
    O: 'static,
{
    let config = RunConfig::new().with_time_limit(time_limit).with_throttle(Some(1));
    first_success(Factory::Fallback, host, requestors, config)
}
