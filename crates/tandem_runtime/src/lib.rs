//! TANDEM Runtime
//!
//! Single-threaded scheduling for requestors: a shared coordinator that
//! launches, throttles, times out and cancels, the combinators built on it,
//! and two host event loops to drive them.
//!
//! Combinators are requestors themselves, so they nest freely:
//!
//! ```text
//! parallel(
//!     required: [sequence([auth, load]), race([primary, replica])],
//!     optional: [fallback([cache, recompute])],
//! )
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod fallback;
pub mod host;
pub mod leaf;
pub mod local;
pub mod parallel;
pub mod parallel_object;
pub mod race;
pub mod sequence;
pub mod tokio_loop;

#[cfg(test)]
mod testing;

// Re-exports
pub use coordinator::{Coordinator, Phase, Policy, Roster, RunConfig};
pub use fallback::fallback;
pub use host::{EventLoop, Host, TimerId};
pub use local::LocalLoop;
pub use parallel::{Completion, parallel};
pub use parallel_object::{NamedResults, parallel_object};
pub use race::race;
pub use sequence::sequence;
pub use tokio_loop::TokioLoop;
