//! Named adapter over [`parallel`](crate::parallel::parallel).
//!
//! Requestors are given as explicit `(name, requestor)` lists. The combined
//! order is fixed: required names first, in the order given, then optional
//! names. Results come back as an ordered map in that same order.

use crate::coordinator::RunConfig;
use crate::host::Host;
use crate::parallel::{Completion, gather};
use indexmap::IndexMap;
use std::rc::Rc;
use std::time::Duration;
use tandem_core::validate;
use tandem_core::{Callback, ConfigError, ConfigResult, Factory, SharedRequestor, shared};

/// Named results; `None` for optionals that failed or were cut off
pub type NamedResults<O> = IndexMap<String, Option<O>>;

/// Run named required and optional requestors concurrently
///
/// Semantics are those of [`parallel`](crate::parallel::parallel); failures
/// pass through unchanged.
///
/// # Errors
///
/// Returns error if a name is used twice, both lists are empty, or
/// `throttle` is zero
pub fn parallel_object<I, O>(
    host: &Host,
    required: Vec<(String, SharedRequestor<I, O>)>,
    optional: Vec<(String, SharedRequestor<I, O>)>,
    time_limit: Option<Duration>,
    throttle: Option<usize>,
    completion: Completion,
) -> ConfigResult<SharedRequestor<I, NamedResults<O>>>
where
    I: Clone + 'static,
    O: 'static,
{
    let factory = Factory::ParallelObject;
    validate::check_unique_names(
        factory,
        required.iter().chain(optional.iter()).map(|(name, _)| name.as_str()),
    )?;
    if required.is_empty() && optional.is_empty() {
        return Err(ConfigError::Empty { factory });
    }

    let mut names = Vec::with_capacity(required.len() + optional.len());
    let required = split(required, &mut names);
    let optional = split(optional, &mut names);
    let names: Rc<[String]> = names.into();

    let config = RunConfig::new().with_time_limit(time_limit).with_throttle(throttle);
    let positional = gather(factory, host, required, optional, config, completion)?;

    Ok(shared(move |callback: Callback<NamedResults<O>>, value: I| {
        let names = names.clone();
        positional.start(
            Callback::new(move |result: Result<Vec<Option<O>>, _>| {
                callback.call(result.map(|values| names.iter().cloned().zip(values).collect()));
            }),
            value,
        )
    }))
}

/// Move names out into `names`, keeping the requestors in the same order
fn split<I, O>(entries: Vec<(String, SharedRequestor<I, O>)>, names: &mut Vec<String>) -> Vec<SharedRequestor<I, O>> {
    entries
        .into_iter()
        .map(|(name, requestor)| {
            names.push(name);
            requestor
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf;
    use crate::local::LocalLoop;
    use crate::testing::{Probe, sink};
    use tandem_core::{CancelReason, RequestorError};

    fn named(name: &str, probe: &Probe<(), i32>) -> (String, SharedRequestor<(), i32>) {
        (name.to_string(), probe.requestor())
    }

    #[test]
    fn test_duplicate_name_across_lists() {
        let event_loop = LocalLoop::new();
        let (rx, ry) = (Probe::new(), Probe::new());
        let result = parallel_object(
            &event_loop.host(),
            vec![named("x", &rx)],
            vec![named("x", &ry)],
            None,
            None,
            Completion::Required,
        );
        assert_eq!(
            result.err(),
            Some(ConfigError::DuplicateName { factory: Factory::ParallelObject, name: "x".to_string() })
        );
    }

    #[test]
    fn test_empty_lists() {
        let event_loop = LocalLoop::new();
        let result = parallel_object::<(), i32>(
            &event_loop.host(),
            Vec::new(),
            Vec::new(),
            None,
            None,
            Completion::Required,
        );
        assert_eq!(result.err(), Some(ConfigError::Empty { factory: Factory::ParallelObject }));
    }

    #[test]
    fn test_named_results_in_declared_order() {
        let event_loop = LocalLoop::new();
        let (b, a, c) = (Probe::new(), Probe::new(), Probe::new());
        let par = parallel_object(
            &event_loop.host(),
            vec![named("b", &b), named("a", &a)],
            vec![named("c", &c)],
            None,
            None,
            Completion::Required,
        )
        .unwrap();
        let (callback, outcomes) = sink();

        par.start(callback, ());
        event_loop.run_until_idle();
        a.succeed(1);
        b.succeed(2);

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes.len(), 1);
        let results = outcomes[0].as_ref().unwrap();
        let entries: Vec<(&str, Option<i32>)> = results.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(entries, vec![("b", Some(2)), ("a", Some(1)), ("c", None)]);
        assert_eq!(c.cancels(), vec![CancelReason::Optional { factory: Factory::ParallelObject }]);
    }

    #[test]
    fn test_failure_passes_through() {
        let event_loop = LocalLoop::new();
        let host = event_loop.host();
        let par = parallel_object::<(), i32>(
            &host,
            vec![("db".to_string(), leaf::fail_after(&host, Duration::from_millis(3), "db offline"))],
            vec![("cache".to_string(), leaf::succeed_after(&host, Duration::from_millis(1), 9))],
            None,
            None,
            Completion::Required,
        )
        .unwrap();
        let (callback, outcomes) = sink();

        par.start(callback, ());
        event_loop.run();
        assert_eq!(*outcomes.borrow(), vec![Err(RequestorError::failed("db offline"))]);
    }

    #[test]
    fn test_timeout_names_factory() {
        let event_loop = LocalLoop::new();
        let host = event_loop.host();
        let budget = Duration::from_millis(5);
        let par = parallel_object::<(), i32>(
            &host,
            vec![("slow".to_string(), leaf::never())],
            Vec::new(),
            Some(budget),
            None,
            Completion::All,
        )
        .unwrap();
        let (callback, outcomes) = sink();

        par.start(callback, ());
        event_loop.run();
        assert_eq!(
            *outcomes.borrow(),
            vec![Err(RequestorError::Timeout { factory: Factory::ParallelObject, budget })]
        );
    }
}
