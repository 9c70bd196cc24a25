//! Per-leaf start and settle times of a plan run.

use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tandem_core::{Callback, CancelHandle, RequestorError, SharedRequestor, shared};
use tandem_runtime::Host;

/// How far a leaf got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    /// Started, not settled
    Running,
    /// Reported a success
    Succeeded,
    /// Reported a failure
    Failed,
    /// Cancelled before reporting
    Cancelled,
}

impl LeafStatus {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One leaf's life on the loop clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Path of the leaf in the plan, e.g. `total/1`
    pub leaf: String,
    /// Loop time at start
    pub started: Duration,
    /// Loop time at success, failure or cancel
    pub settled: Option<Duration>,
    /// Final state
    pub status: LeafStatus,
}

impl Span {
    /// JSON form for reports
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "leaf": self.leaf,
            "status": self.status.as_str(),
            "started_ms": millis(self.started),
            "settled_ms": self.settled.map(millis),
        })
    }
}

/// Shared recorder of leaf spans, in start order
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    spans: Rc<RefCell<Vec<Span>>>,
}

impl Timeline {
    /// Create an empty timeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every span so far
    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        self.spans.borrow().clone()
    }

    /// Find a span by leaf path
    #[must_use]
    pub fn span(&self, leaf: &str) -> Option<Span> {
        self.spans.borrow().iter().find(|span| span.leaf == leaf).cloned()
    }

    /// Wrap `requestor` so each start and settle is recorded under `leaf`
    pub fn trace<I, O>(&self, host: &Host, leaf: String, requestor: SharedRequestor<I, O>) -> SharedRequestor<I, O>
    where
        I: 'static,
        O: 'static,
    {
        let timeline = self.clone();
        let host = host.clone();
        let leaf: Rc<str> = leaf.into();

        shared(move |callback: Callback<O>, value: I| {
            let index = timeline.begin(&leaf, host.now());

            let (on_report, clock) = (timeline.clone(), host.clone());
            let handle = requestor.start(
                Callback::new(move |result: Result<O, RequestorError>| {
                    let status = if result.is_ok() { LeafStatus::Succeeded } else { LeafStatus::Failed };
                    on_report.finish(index, status, clock.now());
                    callback.call(result);
                }),
                value,
            );

            let (on_cancel, clock) = (timeline.clone(), host.clone());
            handle.map(|handle| {
                CancelHandle::new(move |reason| {
                    on_cancel.finish(index, LeafStatus::Cancelled, clock.now());
                    handle.cancel(reason);
                })
            })
        })
    }

    fn begin(&self, leaf: &str, at: Duration) -> usize {
        let mut spans = self.spans.borrow_mut();
        spans.push(Span {
            leaf: leaf.to_string(),
            started: at,
            settled: None,
            status: LeafStatus::Running,
        });
        spans.len() - 1
    }

    /// First settle wins
    fn finish(&self, index: usize, status: LeafStatus, at: Duration) {
        let mut spans = self.spans.borrow_mut();
        if let Some(span) = spans.get_mut(index).filter(|span| span.status == LeafStatus::Running) {
            span.settled = Some(at);
            span.status = status;
        }
    }
}

/// Whole milliseconds, saturating
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
