//! Leaf requestors built on the host's timer facility.
//!
//! Useful as stand-ins for real work in demos and tests. Timer-backed leaves
//! return a cancel handle that disarms their timer.

use crate::host::Host;
use std::rc::Rc;
use std::time::Duration;
use tandem_core::{Callback, CancelHandle, RequestorError, SharedRequestor, shared};

/// Succeed with `value` after `delay`
pub fn succeed_after<I, O>(host: &Host, delay: Duration, value: O) -> SharedRequestor<I, O>
where
    I: 'static,
    O: Clone + 'static,
{
    map_after(host, delay, move |_: I| Ok(value.clone()))
}

/// Fail with `message` after `delay`
pub fn fail_after<I, O>(host: &Host, delay: Duration, message: impl Into<String>) -> SharedRequestor<I, O>
where
    I: 'static,
    O: 'static,
{
    let message = message.into();
    map_after(host, delay, move |_: I| Err(RequestorError::failed(message.clone())))
}

/// Transform the input after `delay`
pub fn map_after<I, O, F>(host: &Host, delay: Duration, f: F) -> SharedRequestor<I, O>
where
    I: 'static,
    O: 'static,
    F: Fn(I) -> Result<O, RequestorError> + 'static,
{
    let host = host.clone();
    let f = Rc::new(f);
    shared(move |callback: Callback<O>, value: I| {
        let f = f.clone();
        let id = host.set_timer(delay, move || callback.call(f(value)));
        let host = host.clone();
        Some(CancelHandle::new(move |_| host.clear_timer(id)))
    })
}

/// Never complete
///
/// The callback is dropped unused; cancelling is a no-op.
pub fn never<I, O>() -> SharedRequestor<I, O>
where
    I: 'static,
    O: 'static,
{
    shared(|_callback: Callback<O>, _value: I| Some(CancelHandle::new(|_| {})))
}

/// Complete synchronously, inside `start`
pub fn from_fn<I, O, F>(f: F) -> SharedRequestor<I, O>
where
    I: 'static,
    O: 'static,
    F: Fn(I) -> Result<O, RequestorError> + 'static,
{
    shared(move |callback: Callback<O>, value: I| {
        callback.call(f(value));
        None
    })
}
