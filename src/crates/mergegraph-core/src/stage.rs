//! Stage handlers - the named units of work in a graph
//!
//! A stage takes ownership of the state, does its work (possibly calling
//! collaborators), and hands the updated state back. Stages never see the state
//! while another stage holds it.
//!
//! Implement [`Stage`] directly for stateful handlers, or pass a closure to
//! [`StateGraph::add_node`](crate::StateGraph::add_node), which wraps it in a
//! [`FnStage`]:
//!
//! ```rust
//! use mergegraph_core::{ControlState, StageFuture, StateGraph, StepStatus, END};
//!
//! let mut graph = StateGraph::<ControlState>::new();
//! graph.add_node("draft", |mut state: ControlState| -> StageFuture<ControlState> {
//!     Box::pin(async move {
//!         state.set_current_step(StepStatus::completed("draft"));
//!         Ok(state)
//!     })
//! });
//! graph.set_entry("draft");
//! graph.add_edge("draft", END);
//! assert!(graph.compile().is_ok());
//! ```

use crate::error::StageError;
use crate::state::WorkflowState;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Future returned by closure-based stages
pub type StageFuture<S> = BoxFuture<'static, Result<S, StageError>>;

/// Structural role of a stage, used for tracing and diagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Ordinary unit of work
    Task,
    /// Approval gate; only writes a decision
    Gate,
    /// Self-looping stage driven by a bounded loop controller
    Loop,
}

/// A unit of work applied to the shared state
///
/// On success a stage sets `current_step` to a value identifying itself so the
/// following router can branch on it. Missing optional artifacts are treated as
/// empty values, not failures.
#[async_trait]
pub trait Stage<S: WorkflowState>: Send + Sync {
    /// Apply the stage to `state`, returning the updated state
    async fn apply(&self, state: S) -> Result<S, StageError>;

    /// Structural role of the stage
    fn kind(&self) -> StageKind {
        StageKind::Task
    }
}

/// Adapter turning a closure into a [`Stage`]
pub struct FnStage<F> {
    func: F,
}

impl<F> FnStage<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<S, F> Stage<S> for FnStage<F>
where
    S: WorkflowState,
    F: Fn(S) -> StageFuture<S> + Send + Sync,
{
    async fn apply(&self, state: S) -> Result<S, StageError> {
        (self.func)(state).await
    }
}

/// Stage that returns the state untouched apart from its completion token
///
/// Used for the "finalize" junction points between pipeline phases.
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<S: WorkflowState> Stage<S> for Passthrough {
    async fn apply(&self, mut state: S) -> Result<S, StageError> {
        state
            .control_mut()
            .set_current_step(crate::state::StepStatus::completed(self.name.clone()));
        Ok(state)
    }
}
