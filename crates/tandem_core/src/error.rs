//! Error types for TANDEM.
//!
//! Two classes are kept apart on purpose:
//! - [`ConfigError`] is returned synchronously when a combinator is wired up
//!   with bad arguments.
//! - [`RequestorError`] travels through callbacks once work is running.

use crate::reason::Factory;
use std::time::Duration;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Misuse detected while building or starting a combinator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No requestors were supplied
    #[error("{factory}: Empty requestor list")]
    Empty {
        /// Factory that rejected the list
        factory: Factory,
    },

    /// Throttle must be at least one
    #[error("{factory}: Bad throttle (0)")]
    ZeroThrottle {
        /// Factory that rejected the throttle
        factory: Factory,
    },

    /// The same name was given to more than one requestor
    #[error("{factory}: Duplicate name \"{name}\"")]
    DuplicateName {
        /// Factory that rejected the names
        factory: Factory,
        /// The repeated name
        name: String,
    },
}

impl ConfigError {
    /// Factory that raised the error
    #[must_use]
    pub const fn factory(&self) -> Factory {
        match self {
            Self::Empty { factory }
            | Self::ZeroThrottle { factory }
            | Self::DuplicateName { factory, .. } => *factory,
        }
    }
}

/// Failure delivered through a requestor callback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestorError {
    /// Failure reported by a leaf requestor
    #[error("{0}")]
    Failed(String),

    /// A requestor panicked while being started instead of using its callback
    #[error("requestor {index} panicked: {message}")]
    Panicked {
        /// Position of the requestor in its coordinator
        index: usize,
        /// Panic payload, if it was a string
        message: String,
    },

    /// A combinator's time budget elapsed before it could succeed
    #[error("{factory}: Timeout after {budget:?}")]
    Timeout {
        /// Factory whose timer fired
        factory: Factory,
        /// The configured budget
        budget: Duration,
    },
}

impl RequestorError {
    /// Create a leaf failure
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Check if this is a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Factory that produced this error, if a combinator did
    #[must_use]
    pub const fn factory(&self) -> Option<Factory> {
        match self {
            Self::Timeout { factory, .. } => Some(*factory),
            Self::Failed(_) | Self::Panicked { .. } => None,
        }
    }
}

impl From<&str> for RequestorError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<String> for RequestorError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}
