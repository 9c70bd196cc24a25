//! Wiring-time argument checks shared by all combinators.
//!
//! Shape checks on callables are handled by the type system; what remains
//! here are the value-level checks a type cannot express.

use crate::error::{ConfigError, ConfigResult};
use crate::reason::Factory;
use std::collections::HashSet;
use std::time::Duration;

/// Reject an empty requestor list
///
/// # Errors
///
/// Returns [`ConfigError::Empty`] if `count` is zero
pub fn require_requestors(factory: Factory, count: usize) -> ConfigResult<()> {
    if count == 0 {
        return Err(ConfigError::Empty { factory });
    }
    Ok(())
}

/// Resolve the number of requestors allowed to run at once
///
/// `None` means no limit beyond the list itself. The result is clamped to
/// `count`.
///
/// # Errors
///
/// Returns [`ConfigError::ZeroThrottle`] for `Some(0)`
pub fn resolve_throttle(factory: Factory, throttle: Option<usize>, count: usize) -> ConfigResult<usize> {
    match throttle {
        Some(0) => Err(ConfigError::ZeroThrottle { factory }),
        Some(limit) => Ok(limit.min(count)),
        None => Ok(count),
    }
}

/// Normalize a time budget: zero means no deadline
#[must_use]
pub fn effective_time_limit(time_limit: Option<Duration>) -> Option<Duration> {
    time_limit.filter(|budget| !budget.is_zero())
}

/// Reject a name that appears more than once
///
/// # Errors
///
/// Returns [`ConfigError::DuplicateName`] naming the first repeat
pub fn check_unique_names<'a>(
    factory: Factory,
    names: impl IntoIterator<Item = &'a str>,
) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                factory,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
