//! Execution trace and run reports
//!
//! The runner records one [`TraceEvent`] per executed stage. The trace is the
//! call-order list used to check sequencing (entity B never starts before entity
//! A finishes), to count loop passes, and to see which stages degraded.

use crate::stage::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a single stage invocation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The stage returned an updated state
    Completed,
    /// A collaborator failed; the pre-stage state was kept and the error recorded
    Recovered {
        /// Recorded failure message
        message: String,
    },
}

/// One executed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 1-based step number within the run
    pub step: usize,
    /// Stage name
    pub node: String,
    /// Structural role of the stage
    pub kind: StageKind,
    pub outcome: StepOutcome,
    /// Router label taken, for conditional transitions
    pub label: Option<String>,
    /// Node selected next (may be the END sentinel)
    pub next: String,
    /// Wall-clock time spent in the stage
    pub elapsed_ms: u64,
}

/// Ordered list of executed stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stage names in execution order
    pub fn nodes(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.node.as_str()).collect()
    }

    /// How many times `node` ran
    pub fn count(&self, node: &str) -> usize {
        self.events.iter().filter(|e| e.node == node).count()
    }

    /// Index of the first execution of `node`
    pub fn first_position(&self, node: &str) -> Option<usize> {
        self.events.iter().position(|e| e.node == node)
    }

    /// Index of the last execution of `node`
    pub fn last_position(&self, node: &str) -> Option<usize> {
        self.events.iter().rposition(|e| e.node == node)
    }

    /// Events whose collaborator failure was recovered
    pub fn recovered(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e.outcome, StepOutcome::Recovered { .. }))
    }

    pub fn last(&self) -> Option<&TraceEvent> {
        self.events.last()
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// A non-gate stage transitioned to END
    Completed,
    /// A gate declined and routed to END; partial results are kept
    GateDeclined {
        /// Gate that declined
        node: String,
    },
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport<S> {
    pub run_id: Uuid,
    /// Final state
    pub state: S,
    pub trace: ExecutionTrace,
    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl<S> RunReport<S> {
    /// Stages executed in this invocation
    pub fn steps(&self) -> usize {
        self.trace.len()
    }

    pub fn declined(&self) -> bool {
        matches!(self.termination, Termination::GateDeclined { .. })
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn into_state(self) -> S {
        self.state
    }
}
