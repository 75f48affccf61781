//! # mergegraph-core - workflow orchestration engine
//!
//! A small engine for long-running, multi-stage analysis pipelines: named stages
//! connected by direct or router-selected transitions, approval gates, bounded
//! self-loops, sequential composition of sub-graphs, and a single-threaded
//! runner that threads one state value through every stage.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Sequencer                                                    │
//! │  Segment A ──▶ Segment B ──▶ pipeline-level segments          │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 │ build()
//! ┌───────────────────────────────▼───────────────────────────────┐
//! │  StateGraph  (stages, gates, bounded loops, edges, routers)   │
//! └───────────────────────────────┬───────────────────────────────┘
//!                                 │ compile()  → validation
//! ┌───────────────────────────────▼───────────────────────────────┐
//! │  CompiledGraph (runner)                                       │
//! │  entry ─▶ stage.apply(state) ─▶ route ─▶ next ... ─▶ END      │
//! │  step ceiling · error recovery · trace · checkpoints          │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core concepts
//!
//! - [`WorkflowState`] - the application's state type; exposes a [`ControlState`]
//!   block (`current_step`, iteration counters, work queues, error slot)
//! - [`Stage`] - `apply(state) -> state`, owning the state for the call
//! - [`Gate`] - a stage that only records a confirmed/rejected decision
//! - [`Router`] - a pure function from state to a closed [`RouteLabel`] set
//! - [`BoundedLoop`] - wraps a self-looping stage with a pass counter and ceiling
//! - [`Sequencer`] - chains [`Segment`]s into one linear pipeline
//! - [`CompiledGraph`] - executes the graph and produces a [`RunReport`]
//!
//! ## Errors
//!
//! Stages return [`StageError`]. Collaborator failures are recovered by the
//! runner (the pre-stage state is kept and the message recorded); report write
//! failures and internal errors abort the run as a [`GraphError`].
//!
//! ## Quick start
//!
//! ```rust
//! use mergegraph_core::{
//!     BoundedLoop, ControlState, FnStage, Gate, StageFuture, StateGraph, StepStatus, END,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let search = FnStage::new(|mut state: ControlState| -> StageFuture<ControlState> {
//!     Box::pin(async move {
//!         state.next_work("acme");
//!         state.set_current_step(StepStatus::completed("web_search"));
//!         Ok(state)
//!     })
//! });
//!
//! let mut graph = StateGraph::<ControlState>::new();
//! graph
//!     .add_gate(Gate::preseeded("research_approval", true), "web_search")
//!     .add_loop("web_search", BoundedLoop::new("acme", 26, search), "summary")
//!     .add_node("summary", |mut state: ControlState| -> StageFuture<ControlState> {
//!         Box::pin(async move {
//!             state.set_current_step(StepStatus::completed("summary"));
//!             Ok(state)
//!         })
//!     })
//!     .add_edge("summary", END)
//!     .set_entry("research_approval");
//!
//! let mut state = ControlState::with_keys(["acme"]);
//! state.enqueue_work("acme", ["revenue", "suppliers"]);
//!
//! let report = graph.compile().unwrap().invoke_with_report(state).await.unwrap();
//! assert_eq!(report.trace.count("web_search"), 2);
//! assert_eq!(report.state.current_step().to_string(), "summary");
//! # });
//! ```

pub mod builder;
pub mod checkpoint;
pub mod compiled;
pub mod error;
pub mod gate;
pub mod graph;
pub mod loop_control;
pub mod retry;
pub mod router;
pub mod sequencer;
pub mod stage;
pub mod state;
pub mod trace;
pub mod visualization;

pub use builder::StateGraph;
pub use checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver};
pub use compiled::{CompiledGraph, DEFAULT_STEP_LIMIT};
pub use error::{GraphError, Result, StageError};
pub use gate::{ApprovalProvider, ApprovalStrategy, Gate, GateRouter};
pub use graph::{Edge, Graph, NodeId, NodeSpec, END, START};
pub use loop_control::{BoundedLoop, LoopRouter, DEFAULT_LOOP_CEILING};
pub use retry::{with_retry, with_retry_if, RetryPolicy};
pub use router::{FnRouter, GateRoute, LoopRoute, RouteLabel, Router};
pub use sequencer::{Segment, Sequencer};
pub use stage::{FnStage, Passthrough, Stage, StageFuture, StageKind};
pub use state::{ControlState, GateOutcome, StepStatus, WorkflowState};
pub use trace::{ExecutionTrace, RunReport, StepOutcome, Termination, TraceEvent};
pub use visualization::{visualize, DiagramFormat};
