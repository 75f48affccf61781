//! Approval gates (human-in-the-loop or pre-seeded)
//!
//! A [`Gate`] is a stage whose only effect is writing a confirmed or rejected
//! [`StepStatus`] for its own identity. The paired [`GateRouter`] reads that
//! status right afterwards:
//!
//! ```text
//!   ┌────────────┐   Confirmed   ┌──────────────────┐
//!   │  gate      │──────────────▶│  guarded stage   │
//!   │ (decision) │               └──────────────────┘
//!   └─────┬──────┘
//!         │ Rejected / anything else
//!         ▼
//!        END
//! ```
//!
//! How the decision is made is chosen at construction by [`ApprovalStrategy`]:
//! ask an [`ApprovalProvider`] (interactive runs) or return a fixed answer
//! (unattended runs). The graph is identical either way.
//!
//! ```rust
//! use mergegraph_core::{ControlState, Gate, GateRoute, Router, Stage};
//!
//! # tokio_test_block(async {
//! let gate = Gate::preseeded("fin_human_approval_a", false);
//! let state = gate.apply(ControlState::default()).await.unwrap();
//! assert_eq!(gate.router().route(&state), GateRoute::Terminate);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

use crate::error::StageError;
use crate::router::{GateRoute, Router};
use crate::stage::{Stage, StageKind};
use crate::state::{GateOutcome, StepStatus, WorkflowState};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// External yes/no input, used by interactive gates
#[async_trait]
pub trait ApprovalProvider: Send + Sync {
    /// Block until the operator answers
    async fn ask_yes_no(&self, prompt: &str) -> bool;
}

/// How a gate decides
#[derive(Clone)]
pub enum ApprovalStrategy {
    /// Ask an external provider every time the gate runs
    Interactive(Arc<dyn ApprovalProvider>),
    /// Return a decision fixed at graph construction
    Preseeded(bool),
}

impl fmt::Debug for ApprovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStrategy::Interactive(_) => f.write_str("Interactive(<provider>)"),
            ApprovalStrategy::Preseeded(decision) => f.debug_tuple("Preseeded").field(decision).finish(),
        }
    }
}

/// Approval gate stage
#[derive(Debug, Clone)]
pub struct Gate {
    name: String,
    prompt: String,
    strategy: ApprovalStrategy,
}

impl Gate {
    pub fn new(name: impl Into<String>, strategy: ApprovalStrategy) -> Self {
        let name = name.into();
        let prompt = format!("Approve '{}' and continue?", name);
        Self { name, prompt, strategy }
    }

    /// Gate with a fixed decision
    pub fn preseeded(name: impl Into<String>, approved: bool) -> Self {
        Self::new(name, ApprovalStrategy::Preseeded(approved))
    }

    /// Gate that asks `provider`
    pub fn interactive(name: impl Into<String>, provider: Arc<dyn ApprovalProvider>) -> Self {
        Self::new(name, ApprovalStrategy::Interactive(provider))
    }

    /// Replace the question shown to interactive operators
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &ApprovalStrategy {
        &self.strategy
    }

    /// Router reading this gate's decision
    pub fn router(&self) -> GateRouter {
        GateRouter::new(self.name.clone())
    }

    async fn decide(&self) -> GateOutcome {
        let approved = match &self.strategy {
            ApprovalStrategy::Preseeded(decision) => *decision,
            ApprovalStrategy::Interactive(provider) => provider.ask_yes_no(&self.prompt).await,
        };
        GateOutcome::from_decision(approved)
    }
}

#[async_trait]
impl<S: WorkflowState> Stage<S> for Gate {
    async fn apply(&self, mut state: S) -> Result<S, StageError> {
        let outcome = self.decide().await;
        info!(gate = %self.name, outcome = outcome.as_str(), "Gate decision");
        state
            .control_mut()
            .set_current_step(StepStatus::gate(self.name.clone(), outcome));
        Ok(state)
    }

    fn kind(&self) -> StageKind {
        StageKind::Gate
    }
}

/// Router paired with a [`Gate`]
///
/// Returns [`GateRoute::Continue`] only when the state carries this gate's
/// confirmed token; any other token (rejected, another stage's, or not started)
/// falls back to [`GateRoute::Terminate`].
#[derive(Debug, Clone)]
pub struct GateRouter {
    gate: String,
}

impl GateRouter {
    pub fn new(gate: impl Into<String>) -> Self {
        Self { gate: gate.into() }
    }
}

impl<S: WorkflowState> Router<S> for GateRouter {
    type Label = GateRoute;

    fn route(&self, state: &S) -> GateRoute {
        match state.control().current_step().gate_outcome(&self.gate) {
            Some(GateOutcome::Confirmed) => GateRoute::Continue,
            _ => GateRoute::Terminate,
        }
    }
}
