//! JSON composition plans.
//!
//! A plan is a tree of combinators over simulated leaves. Every node maps
//! JSON to JSON, so any plan can be nested inside any other:
//!
//! ```json
//! {"race": {"time_limit_ms": 50, "of": [
//!     {"leaf": {"after_ms": 30, "succeed": "primary"}},
//!     {"leaf": {"after_ms": 10, "fail": "replica down"}}
//! ]}}
//! ```
//!
//! Positional results become arrays and named results become objects, with
//! `null` for optionals that did not make it.

use crate::timeline::Timeline;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tandem_core::{Callback, ConfigError, RequestorError, SharedRequestor, shared};
use tandem_runtime::{Completion, Host, NamedResults, fallback, leaf, parallel, parallel_object, race, sequence};

/// Requestor from JSON to JSON
pub type JsonRequestor = SharedRequestor<Value, Value>;

/// Plan loading and wiring errors
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Plan file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the plan file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Plan text is not a valid plan
    #[error("invalid plan: {0}")]
    Parse(#[from] serde_json::Error),

    /// A combinator rejected its arguments
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One node of a composition plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Simulated unit of work
    Leaf(LeafPlan),
    /// Unit of work that never completes
    Never,
    /// Run in order, threading values
    Sequence(SerialPlan),
    /// Try in order until one succeeds
    Fallback(SerialPlan),
    /// Run concurrently, first success wins
    Race(RacePlan),
    /// Required and optional, positional results
    Parallel(ParallelPlan),
    /// Required and optional, named results
    ParallelObject(ParallelObjectPlan),
}

/// Simulated leaf: wait, then act
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafPlan {
    /// Delay before completing
    #[serde(default)]
    pub after_ms: u64,
    /// What to complete with
    #[serde(flatten)]
    pub action: LeafAction,
}

/// Leaf completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafAction {
    /// Succeed with a fixed value
    Succeed(Value),
    /// Fail with a message
    Fail(String),
    /// Succeed with the numeric input plus this amount
    Add(i64),
}

/// Sequence or fallback node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialPlan {
    /// Time budget in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Steps, in order
    pub of: Vec<Plan>,
}

/// Race node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RacePlan {
    /// Time budget in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Maximum contenders running at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<usize>,
    /// Contenders
    pub of: Vec<Plan>,
}

/// Parallel node with positional results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelPlan {
    /// Time budget in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Maximum requestors running at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<usize>,
    /// Requestors that must succeed
    #[serde(default)]
    pub required: Vec<Plan>,
    /// Requestors whose failure is tolerated
    #[serde(default)]
    pub optional: Vec<Plan>,
    /// When the node may succeed
    #[serde(default)]
    pub completion: Completion,
}

/// Parallel node with named results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelObjectPlan {
    /// Time budget in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    /// Maximum requestors running at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<usize>,
    /// Named requestors that must succeed
    #[serde(default)]
    pub required: IndexMap<String, Plan>,
    /// Named requestors whose failure is tolerated
    #[serde(default)]
    pub optional: IndexMap<String, Plan>,
    /// When the node may succeed
    #[serde(default)]
    pub completion: Completion,
}

impl Plan {
    /// Parse a plan from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid plan
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a plan from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Number of leaves in the tree
    #[must_use]
    pub fn leaves(&self) -> usize {
        match self {
            Self::Leaf(_) | Self::Never => 1,
            Self::Sequence(plan) | Self::Fallback(plan) => plan.of.iter().map(Self::leaves).sum(),
            Self::Race(plan) => plan.of.iter().map(Self::leaves).sum(),
            Self::Parallel(plan) => plan.required.iter().chain(&plan.optional).map(Self::leaves).sum(),
            Self::ParallelObject(plan) => plan.required.values().chain(plan.optional.values()).map(Self::leaves).sum(),
        }
    }

    /// Wire the plan into a requestor on `host`
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found, outermost last
    pub fn build(&self, host: &Host) -> Result<JsonRequestor, PlanError> {
        self.wire(host, None, "")
    }

    /// Like [`build`](Self::build), recording every leaf into `timeline`
    ///
    /// Leaves are named by their path, e.g. `total/1` for the second step
    /// of the sequence named `total`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found, outermost last
    pub fn build_traced(&self, host: &Host, timeline: &Timeline) -> Result<JsonRequestor, PlanError> {
        self.wire(host, Some(timeline), "")
    }

    fn wire(&self, host: &Host, timeline: Option<&Timeline>, path: &str) -> Result<JsonRequestor, PlanError> {
        let requestor = match self {
            Self::Leaf(plan) => traced(host, timeline, path, plan.build(host)),
            Self::Never => traced(host, timeline, path, leaf::never()),
            Self::Sequence(plan) => sequence(host, wire_all(host, timeline, path, &plan.of)?, millis(plan.time_limit_ms))?,
            Self::Fallback(plan) => fallback(host, wire_all(host, timeline, path, &plan.of)?, millis(plan.time_limit_ms))?,
            Self::Race(plan) => race(
                host,
                wire_all(host, timeline, path, &plan.of)?,
                millis(plan.time_limit_ms),
                plan.throttle,
            )?,
            Self::Parallel(plan) => {
                let positional = parallel(
                    host,
                    wire_all(host, timeline, &child(path, "required"), &plan.required)?,
                    wire_all(host, timeline, &child(path, "optional"), &plan.optional)?,
                    millis(plan.time_limit_ms),
                    plan.throttle,
                    plan.completion,
                )?;
                map_output(positional, slots_to_json)
            }
            Self::ParallelObject(plan) => {
                let named = parallel_object(
                    host,
                    wire_named(host, timeline, path, &plan.required)?,
                    wire_named(host, timeline, path, &plan.optional)?,
                    millis(plan.time_limit_ms),
                    plan.throttle,
                    plan.completion,
                )?;
                map_output(named, named_to_json)
            }
        };
        Ok(requestor)
    }
}

impl LeafPlan {
    fn build(&self, host: &Host) -> JsonRequestor {
        let delay = Duration::from_millis(self.after_ms);
        match &self.action {
            LeafAction::Succeed(value) => leaf::succeed_after(host, delay, value.clone()),
            LeafAction::Fail(message) => leaf::fail_after(host, delay, message.clone()),
            LeafAction::Add(amount) => {
                let amount = *amount;
                leaf::map_after(host, delay, move |value: Value| add(&value, amount))
            }
        }
    }
}

fn traced(host: &Host, timeline: Option<&Timeline>, path: &str, requestor: JsonRequestor) -> JsonRequestor {
    match timeline {
        Some(timeline) => {
            let leaf = if path.is_empty() { "root".to_string() } else { path.to_string() };
            timeline.trace(host, leaf, requestor)
        }
        None => requestor,
    }
}

fn child(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}/{segment}")
    }
}

fn wire_all(
    host: &Host,
    timeline: Option<&Timeline>,
    path: &str,
    plans: &[Plan],
) -> Result<Vec<JsonRequestor>, PlanError> {
    plans
        .iter()
        .enumerate()
        .map(|(index, plan)| plan.wire(host, timeline, &child(path, &index.to_string())))
        .collect()
}

fn wire_named(
    host: &Host,
    timeline: Option<&Timeline>,
    path: &str,
    plans: &IndexMap<String, Plan>,
) -> Result<Vec<(String, JsonRequestor)>, PlanError> {
    plans
        .iter()
        .map(|(name, plan)| Ok((name.clone(), plan.wire(host, timeline, &child(path, name))?)))
        .collect()
}

fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

fn add(value: &Value, amount: i64) -> Result<Value, RequestorError> {
    let Value::Number(number) = value else {
        return Err(RequestorError::failed(format!("cannot add {amount} to {value}")));
    };
    if let Some(sum) = number.as_i64().and_then(|n| n.checked_add(amount)) {
        return Ok(Value::from(sum));
    }
    number
        .as_f64()
        .map(|n| Value::from(n + amount as f64))
        .ok_or_else(|| RequestorError::failed(format!("cannot add {amount} to {number}")))
}

/// Adapt a requestor's success value, passing failures through
fn map_output<A: 'static>(requestor: SharedRequestor<Value, A>, convert: fn(A) -> Value) -> JsonRequestor {
    shared(move |callback: Callback<Value>, value: Value| {
        requestor.start(
            Callback::new(move |result: Result<A, RequestorError>| callback.call(result.map(convert))),
            value,
        )
    })
}

fn slots_to_json(slots: Vec<Option<Value>>) -> Value {
    Value::Array(slots.into_iter().map(|slot| slot.unwrap_or(Value::Null)).collect())
}

fn named_to_json(named: NamedResults<Value>) -> Value {
    Value::Object(
        named
            .into_iter()
            .map(|(name, slot)| (name, slot.unwrap_or(Value::Null)))
            .collect(),
    )
}
