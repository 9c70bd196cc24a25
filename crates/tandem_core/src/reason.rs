//! Factory names and cancellation reasons.

use crate::error::RequestorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The combinator that produced a coordinator, a reason, or an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factory {
    /// One requestor at a time, each success feeding the next
    Sequence,
    /// One requestor at a time until one succeeds
    Fallback,
    /// All at once, first success wins
    Race,
    /// Required and optional requestors, positional results
    Parallel,
    /// Required and optional requestors, named results
    ParallelObject,
}

impl Factory {
    /// Name as used in reasons and log fields
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Fallback => "fallback",
            Self::Race => "race",
            Self::Parallel => "parallel",
            Self::ParallelObject => "parallel_object",
        }
    }
}

impl fmt::Display for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a coordinator asked its outstanding requestors to stop
///
/// Handed to every still-active cancel handle. Nested combinators pass the
/// reason they received on to their own children unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CancelReason {
    /// Generic request from the caller
    #[default]
    Cancel,
    /// Another requestor in a race won
    Loser {
        /// Factory that ran the race
        factory: Factory,
        /// Index of the winning requestor
        winner: usize,
    },
    /// Required requestors finished; optional ones are no longer wanted
    Optional {
        /// Factory that issued the cut-off
        factory: Factory,
    },
    /// The time budget elapsed
    Timeout {
        /// Factory whose timer fired
        factory: Factory,
        /// The configured budget
        budget: Duration,
    },
    /// A failure decided the outcome
    Failure {
        /// Factory that gave up
        factory: Factory,
        /// The deciding failure
        error: Box<RequestorError>,
    },
    /// The combinator reported its result and is shutting down
    Settled {
        /// Factory that finished
        factory: Factory,
    },
}

impl CancelReason {
    /// Factory that issued this reason, if any
    #[must_use]
    pub fn factory(&self) -> Option<Factory> {
        match self {
            Self::Cancel => None,
            Self::Loser { factory, .. }
            | Self::Optional { factory }
            | Self::Timeout { factory, .. }
            | Self::Failure { factory, .. }
            | Self::Settled { factory } => Some(*factory),
        }
    }

    /// Short excuse, without evidence
    #[must_use]
    pub const fn excuse(&self) -> &'static str {
        match self {
            Self::Cancel => "Cancel",
            Self::Loser { .. } => "Loser",
            Self::Optional { .. } => "Optional",
            Self::Timeout { .. } => "Timeout",
            Self::Failure { .. } => "Failure",
            Self::Settled { .. } => "Settled",
        }
    }

    /// Check if this is a race loser reason
    #[must_use]
    pub const fn is_loser(&self) -> bool {
        matches!(self, Self::Loser { .. })
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "Cancel"),
            Self::Loser { factory, winner } => {
                write!(f, "{}: Loser (winner {})", factory, winner)
            }
            Self::Optional { factory } => write!(f, "{}: Optional", factory),
            Self::Timeout { factory, budget } => {
                write!(f, "{}: Timeout after {:?}", factory, budget)
            }
            Self::Failure { factory, error } => write!(f, "{}: Failure ({})", factory, error),
            Self::Settled { factory } => write!(f, "{}: Settled", factory),
        }
    }
}
