//! CompiledGraph - the engine that runs a validated workflow
//!
//! Execution is a single flow of control:
//!
//! ```text
//!   current = entry
//!   loop {
//!       current == END            → stop (Completed / GateDeclined)
//!       steps == step_limit       → GraphError::StepLimitExceeded
//!       state = stage(current).apply(state)
//!         Ok                      → keep new state
//!         Err(collaborator)       → restore pre-stage state, record error, go on
//!         Err(other)              → abort with node context
//!       current = transition(current, &state)
//!       checkpoint (if configured)
//!   }
//! ```
//!
//! The runner owns the state between steps and hands it by value to one stage
//! at a time. The step ceiling is independent of any loop controller ceiling
//! and guards against cycles nothing else bounds.

use crate::checkpoint::{Checkpoint, CheckpointSaver};
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeId, END};
use crate::stage::StageKind;
use crate::state::WorkflowState;
use crate::trace::{ExecutionTrace, RunReport, StepOutcome, Termination, TraceEvent};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Global step ceiling used when none is configured
pub const DEFAULT_STEP_LIMIT: usize = 1000;

/// Executable workflow
pub struct CompiledGraph<S: WorkflowState> {
    graph: Arc<Graph<S>>,
    step_limit: usize,
    checkpointer: Option<Arc<dyn CheckpointSaver<S>>>,
}

impl<S: WorkflowState> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            step_limit: self.step_limit,
            checkpointer: self.checkpointer.clone(),
        }
    }
}

/// Where a run starts
struct RunStart<S> {
    run_id: Uuid,
    node: NodeId,
    steps_taken: usize,
    state: S,
}

impl<S: WorkflowState> CompiledGraph<S> {
    /// Wrap an already validated graph
    pub(crate) fn new(graph: Graph<S>) -> Self {
        Self {
            graph: Arc::new(graph),
            step_limit: DEFAULT_STEP_LIMIT,
            checkpointer: None,
        }
    }

    /// Set the global step ceiling (minimum 1)
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit.max(1);
        self
    }

    /// Save a checkpoint after every step
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver<S>>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Run from the entry point and return the final state
    pub async fn invoke(&self, state: S) -> Result<S> {
        self.invoke_with_report(state).await.map(RunReport::into_state)
    }

    /// Run from the entry point and return the full report
    pub async fn invoke_with_report(&self, state: S) -> Result<RunReport<S>> {
        let entry = self
            .graph
            .entry
            .clone()
            .ok_or_else(|| GraphError::Validation("No entry point set".to_string()))?;

        self.run(RunStart {
            run_id: Uuid::new_v4(),
            node: entry,
            steps_taken: 0,
            state,
        })
        .await
    }

    /// Continue a run from a saved checkpoint
    ///
    /// The step ceiling counts the steps recorded in the checkpoint, so a
    /// resumed run cannot exceed the ceiling of the run it continues. Saved
    /// checkpoints after the resumed one are discarded before the run restarts.
    pub async fn resume(&self, checkpoint: Checkpoint<S>) -> Result<RunReport<S>> {
        if checkpoint.next_node != END && !self.graph.nodes.contains_key(&checkpoint.next_node) {
            return Err(GraphError::Checkpoint(format!(
                "Checkpoint resumes at unknown node '{}'",
                checkpoint.next_node
            )));
        }

        if let Some(saver) = &self.checkpointer {
            saver.truncate_after(checkpoint.run_id, checkpoint.step).await?;
        }

        info!(
            run_id = %checkpoint.run_id,
            node = %checkpoint.next_node,
            step = checkpoint.step,
            "Resuming run from checkpoint"
        );
        self.run(RunStart {
            run_id: checkpoint.run_id,
            node: checkpoint.next_node,
            steps_taken: checkpoint.step,
            state: checkpoint.state,
        })
        .await
    }

    async fn run(&self, start: RunStart<S>) -> Result<RunReport<S>> {
        let RunStart {
            run_id,
            node,
            mut steps_taken,
            mut state,
        } = start;

        let started_at = Utc::now();
        let mut trace = ExecutionTrace::new();
        let mut current = node;
        let mut last_kind = None;

        info!(run_id = %run_id, entry = %current, step_limit = self.step_limit, "Starting run");

        while current != END {
            if steps_taken >= self.step_limit {
                error!(run_id = %run_id, limit = self.step_limit, node = %current, "Step limit exceeded");
                return Err(GraphError::StepLimitExceeded {
                    limit: self.step_limit,
                    node: current,
                });
            }

            let spec = self
                .graph
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::Validation(format!("Stage '{}' does not exist", current)))?;

            debug!(run_id = %run_id, step = steps_taken + 1, node = %current, "Executing stage");
            let snapshot = state.clone();
            let timer = Instant::now();

            let outcome = match spec.stage.apply(state).await {
                Ok(next) => {
                    state = next;
                    StepOutcome::Completed
                }
                Err(err) if err.is_recoverable() => {
                    warn!(node = %current, error = %err, "Recovered collaborator failure");
                    state = snapshot;
                    state.control_mut().record_error(&current, &err);
                    StepOutcome::Recovered {
                        message: err.to_string(),
                    }
                }
                Err(err) => {
                    error!(run_id = %run_id, node = %current, error = %err, "Stage failed");
                    return Err(GraphError::from_stage(current, err));
                }
            };
            steps_taken += 1;

            let (next, label) = self.transition(&current, &state)?;
            if let Some(label) = label {
                info!(node = %current, label, next = %next, "Routing decision");
            }

            trace.push(TraceEvent {
                step: steps_taken,
                node: current.clone(),
                kind: spec.kind,
                outcome,
                label: label.map(str::to_string),
                next: next.clone(),
                elapsed_ms: timer.elapsed().as_millis() as u64,
            });

            if let Some(saver) = &self.checkpointer {
                saver
                    .save(Checkpoint {
                        run_id,
                        step: steps_taken,
                        node: current.clone(),
                        next_node: next.clone(),
                        state: state.clone(),
                        created_at: Utc::now(),
                    })
                    .await?;
            }

            last_kind = Some((current, spec.kind));
            current = next;
        }

        let termination = match last_kind {
            Some((node, StageKind::Gate)) => Termination::GateDeclined { node },
            _ => Termination::Completed,
        };

        let finished_at = Utc::now();
        info!(
            run_id = %run_id,
            steps = trace.len(),
            termination = ?termination,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            state,
            trace,
            termination,
            started_at,
            finished_at,
        })
    }

    /// Next node after `current`, and the router label if one decided
    fn transition(&self, current: &str, state: &S) -> Result<(NodeId, Option<&'static str>)> {
        match self.graph.edges.get(current) {
            Some(Edge::Direct(to)) => Ok((to.clone(), None)),
            Some(Edge::Conditional { router, branches, .. }) => {
                let label = router(state);
                branches
                    .get(label)
                    .map(|to| (to.clone(), Some(label)))
                    .ok_or_else(|| GraphError::Routing {
                        node: current.to_string(),
                        label: label.to_string(),
                    })
            }
            None => Err(GraphError::Validation(format!(
                "Stage '{}' has no outgoing transition",
                current
            ))),
        }
    }
}
