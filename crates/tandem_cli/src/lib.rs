//! TANDEM CLI library
//!
//! Loads composition plans and runs them on either event loop.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod plan;
pub mod timeline;

pub use plan::{JsonRequestor, Plan, PlanError};
pub use timeline::{LeafStatus, Span, Timeline};

use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tandem_core::{Callback, CancelReason, RequestorError};
use tandem_runtime::{LocalLoop, TokioLoop};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Outcome of one plan run
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Final result; `None` if the plan never settled
    pub outcome: Option<Result<Value, RequestorError>>,
    /// Virtual time on the local loop, wall time on tokio
    pub elapsed: Duration,
    /// Every leaf started, in start order
    pub timeline: Vec<Span>,
}

impl Report {
    /// Check if the plan succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Some(Ok(_)))
    }

    /// JSON summary for printing
    #[must_use]
    pub fn to_json(&self) -> Value {
        let elapsed_ms = timeline::millis(self.elapsed);
        let mut summary = match &self.outcome {
            Some(Ok(value)) => json!({"status": "ok", "value": value, "elapsed_ms": elapsed_ms}),
            Some(Err(error)) => json!({"status": "failed", "error": error.to_string(), "elapsed_ms": elapsed_ms}),
            None => json!({"status": "unsettled", "elapsed_ms": elapsed_ms}),
        };
        summary["timeline"] = Value::Array(self.timeline.iter().map(Span::to_json).collect());
        summary
    }
}

/// Run a plan to completion on the deterministic loop
///
/// Virtual time jumps straight from timer to timer, so this returns at once
/// whatever the plan's delays. A plan that cannot settle is cancelled once
/// nothing is left to run.
///
/// # Errors
///
/// Returns error if the plan is misconfigured
pub fn run_local(plan: &Plan, input: Value) -> Result<Report, PlanError> {
    let event_loop = LocalLoop::new();
    let timeline = Timeline::new();
    let requestor = plan.build_traced(&event_loop.host(), &timeline)?;

    let slot = Rc::new(RefCell::new(None));
    let sink = slot.clone();
    let handle = requestor.start(Callback::new(move |result| *sink.borrow_mut() = Some(result)), input);
    let steps = event_loop.run();

    let outcome = slot.borrow_mut().take();
    if outcome.is_none() {
        warn!(steps, "plan did not settle");
        if let Some(handle) = handle {
            handle.cancel(CancelReason::Cancel);
        }
    }
    info!(steps, elapsed = ?event_loop.now(), "plan finished");

    Ok(Report {
        outcome,
        elapsed: event_loop.now(),
        timeline: timeline.spans(),
    })
}

/// Run a plan on tokio, waiting at most `patience` for it to settle
///
/// Must be awaited inside a `tokio::task::LocalSet`.
///
/// # Errors
///
/// Returns error if the plan is misconfigured
pub async fn run_tokio(plan: &Plan, input: Value, patience: Duration) -> Result<Report, PlanError> {
    let event_loop = TokioLoop::new();
    let timeline = Timeline::new();
    let requestor = plan.build_traced(&event_loop.host(), &timeline)?;

    let (tx, rx) = oneshot::channel();
    let started = tokio::time::Instant::now();
    let handle = requestor.start(
        Callback::new(move |result| {
            // Receiver gone means the run was abandoned
            let _ = tx.send(result);
        }),
        input,
    );

    let outcome = match tokio::time::timeout(patience, rx).await {
        Ok(received) => received.ok(),
        Err(_) => {
            warn!(?patience, "plan did not settle in time");
            if let Some(handle) = handle {
                handle.cancel(CancelReason::Cancel);
            }
            None
        }
    };
    info!(elapsed = ?started.elapsed(), "plan finished");

    Ok(Report {
        outcome,
        elapsed: started.elapsed(),
        timeline: timeline.spans(),
    })
}
