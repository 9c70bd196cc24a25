//! TANDEM Core Types
//!
//! The requestor contract shared by leaf units and combinators, together with
//! the cancellation reasons and structured errors that flow through it.
//! This crate contains pure types and validation with no I/O and no scheduling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod reason;
pub mod requestor;
pub mod validate;

// Re-exports
pub use error::{ConfigError, ConfigResult, RequestorError};
pub use reason::{CancelReason, Factory};
pub use requestor::{Callback, CancelHandle, Requestor, SharedRequestor, shared};
