//! Shared state contract between the runner and stage handlers
//!
//! The engine is generic over the application's state type. It only needs access
//! to a small block of control fields, grouped in [`ControlState`]:
//!
//! - `current_step` - the last completed stage's self-reported [`StepStatus`]
//! - `iteration_tracker` - monotonic per-key pass counters used by bounded loops
//! - `pending` - per-key FIFO queues of outstanding work items
//! - `error` - the most recent recovered failure message
//!
//! Every field is initialised at construction; nothing is created lazily while
//! the graph runs.
//!
//! # Example
//!
//! ```rust
//! use mergegraph_core::state::{ControlState, WorkflowState};
//!
//! #[derive(Clone, Default)]
//! struct Review {
//!     control: ControlState,
//!     notes: Vec<String>,
//! }
//!
//! impl WorkflowState for Review {
//!     fn control(&self) -> &ControlState { &self.control }
//!     fn control_mut(&mut self) -> &mut ControlState { &mut self.control }
//! }
//!
//! let mut review = Review::default();
//! review.control_mut().enqueue_work("acme", ["q1", "q2"]);
//! assert!(review.control().has_pending("acme"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Decision written by a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Approved; the paired router continues
    Confirmed,
    /// Declined; the paired router terminates
    Rejected,
}

impl GateOutcome {
    /// Map a yes/no answer onto an outcome
    pub fn from_decision(approved: bool) -> Self {
        if approved {
            GateOutcome::Confirmed
        } else {
            GateOutcome::Rejected
        }
    }

    /// Token suffix used in the textual step status
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Confirmed => "confirmed",
            GateOutcome::Rejected => "rejected",
        }
    }
}

/// Self-reported status of the last completed stage
///
/// A closed variant type instead of free-form strings, so routers match on
/// structure. `Display` renders the familiar tokens (`"<stage>_confirmed"`,
/// `"<stage>_rejected"`, or the stage name).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// No stage has completed yet
    #[default]
    NotStarted,
    /// A plain stage finished
    Completed {
        /// Stage identity
        stage: String,
    },
    /// A gate recorded a decision
    Gate {
        /// Gate identity
        stage: String,
        /// Decision
        outcome: GateOutcome,
    },
}

impl StepStatus {
    /// Status for a finished plain stage
    pub fn completed(stage: impl Into<String>) -> Self {
        StepStatus::Completed { stage: stage.into() }
    }

    /// Status for a gate decision
    pub fn gate(stage: impl Into<String>, outcome: GateOutcome) -> Self {
        StepStatus::Gate {
            stage: stage.into(),
            outcome,
        }
    }

    /// Outcome recorded by the named gate, if this status came from it
    pub fn gate_outcome(&self, stage: &str) -> Option<GateOutcome> {
        match self {
            StepStatus::Gate { stage: s, outcome } if s == stage => Some(*outcome),
            _ => None,
        }
    }

    /// Identity of the stage that produced this status
    pub fn stage(&self) -> Option<&str> {
        match self {
            StepStatus::NotStarted => None,
            StepStatus::Completed { stage } | StepStatus::Gate { stage, .. } => Some(stage),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::NotStarted => write!(f, "not_started"),
            StepStatus::Completed { stage } => write!(f, "{}", stage),
            StepStatus::Gate { stage, outcome } => write!(f, "{}_{}", stage, outcome.as_str()),
        }
    }
}

/// Control fields shared by every workflow state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    current_step: StepStatus,
    iteration_tracker: BTreeMap<String, u32>,
    pending: BTreeMap<String, VecDeque<String>>,
    error: Option<String>,
}

impl ControlState {
    /// Fresh control block with counters registered for the given keys
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut control = Self::default();
        for key in keys {
            let key = key.into();
            control.iteration_tracker.insert(key.clone(), 0);
            control.pending.insert(key, VecDeque::new());
        }
        control
    }

    pub fn current_step(&self) -> &StepStatus {
        &self.current_step
    }

    pub fn set_current_step(&mut self, status: StepStatus) {
        self.current_step = status;
    }

    /// Passes recorded for `key` (0 when never advanced)
    pub fn iteration(&self, key: &str) -> u32 {
        self.iteration_tracker.get(key).copied().unwrap_or(0)
    }

    /// Increment the counter for `key` and return the new value
    ///
    /// Counters only move forward; there is no reset within a run.
    pub fn advance_iteration(&mut self, key: &str) -> u32 {
        let counter = self.iteration_tracker.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Snapshot of all counters
    pub fn iteration_tracker(&self) -> &BTreeMap<String, u32> {
        &self.iteration_tracker
    }

    /// Append work items to the back of `key`'s queue
    pub fn enqueue_work<I, T>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.pending
            .entry(key.to_string())
            .or_default()
            .extend(items.into_iter().map(Into::into));
    }

    /// Pop the next work item for `key`, left to right
    pub fn next_work(&mut self, key: &str) -> Option<String> {
        self.pending.get_mut(key).and_then(VecDeque::pop_front)
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.pending.get(key).map_or(false, |queue| !queue.is_empty())
    }

    pub fn pending(&self, key: &str) -> impl Iterator<Item = &str> {
        self.pending
            .get(key)
            .into_iter()
            .flat_map(|queue| queue.iter().map(String::as_str))
    }

    /// Record a recovered failure, prefixed with the originating node
    pub fn record_error(&mut self, node: &str, message: impl fmt::Display) {
        self.error = Some(format!("{}: {}", node, message));
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// State types the engine can drive
///
/// The runner owns the state between steps and hands it by value to exactly one
/// stage at a time; the stage returns the updated value.
pub trait WorkflowState: Clone + Send + Sync + 'static {
    fn control(&self) -> &ControlState;
    fn control_mut(&mut self) -> &mut ControlState;
}

impl WorkflowState for ControlState {
    fn control(&self) -> &ControlState {
        self
    }

    fn control_mut(&mut self) -> &mut ControlState {
        self
    }
}
