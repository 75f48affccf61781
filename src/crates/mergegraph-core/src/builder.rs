//! StateGraph builder API
//!
//! [`StateGraph`] is the fluent builder used to declare stages, gates, bounded
//! loops and the transitions between them. `compile()` validates the structure
//! and produces an executable [`CompiledGraph`].
//!
//! ```text
//! StateGraph (builder)
//!   add_node / add_stage      plain stages
//!   add_gate                  gate + its router, both labels wired
//!   add_loop                  bounded loop + its router, self edge wired
//!   add_edge                  unconditional successor
//!   add_conditional_edge      router with a branch for every label
//!         │
//!         │ compile()  ── duplicate names, unmapped labels, dangling stages
//!         ▼               are reported here as GraphError::Validation
//! CompiledGraph (runner)
//! ```
//!
//! Construction mistakes are collected while building and reported together by
//! `compile()`, so the fluent calls never need a `?`.
//!
//! # Example
//!
//! ```rust
//! use mergegraph_core::{ControlState, Gate, Passthrough, StateGraph, END};
//!
//! let mut graph = StateGraph::<ControlState>::new();
//! graph
//!     .add_stage("collect", Passthrough::new("collect"))
//!     .add_gate(Gate::preseeded("approve", true), "publish")
//!     .add_stage("publish", Passthrough::new("publish"))
//!     .add_edge("collect", "approve")
//!     .add_edge("publish", END)
//!     .set_entry("collect");
//!
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.graph().order.len(), 3);
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::gate::Gate;
use crate::graph::{Edge, Graph, NodeId, NodeSpec, RouteFn, END};
use crate::loop_control::BoundedLoop;
use crate::router::{FnRouter, GateRoute, LoopRoute, RouteLabel, Router};
use crate::stage::{FnStage, Stage, StageFuture};
use crate::state::WorkflowState;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for stateful workflow graphs
pub struct StateGraph<S: WorkflowState> {
    graph: Graph<S>,
    errors: Vec<String>,
}

impl<S: WorkflowState> StateGraph<S> {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            errors: Vec::new(),
        }
    }

    /// Add a stage built from an async closure
    pub fn add_node<F>(&mut self, id: impl Into<NodeId>, executor: F) -> &mut Self
    where
        F: Fn(S) -> StageFuture<S> + Send + Sync + 'static,
    {
        self.add_stage(id, FnStage::new(executor))
    }

    /// Add a stage implemented as a [`Stage`] type
    pub fn add_stage(&mut self, id: impl Into<NodeId>, stage: impl Stage<S> + 'static) -> &mut Self {
        self.insert(id.into(), Arc::new(stage));
        self
    }

    /// Add a gate and wire its router
    ///
    /// `Continue` leads to `on_continue`, `Terminate` to [`END`]. Both labels are
    /// always mapped, so a rejected decision can never fall through silently.
    pub fn add_gate(&mut self, gate: Gate, on_continue: impl Into<NodeId>) -> &mut Self {
        let name = gate.name().to_string();
        let router = gate.router();
        self.insert(name.clone(), Arc::new(gate));
        self.add_conditional_edge(
            name,
            router,
            [
                (GateRoute::Continue, on_continue.into()),
                (GateRoute::Terminate, END.to_string()),
            ],
        )
    }

    /// Add a self-looping stage under a bounded loop controller
    ///
    /// `Continue` leads back to the stage itself, `Completed` to `on_complete`.
    pub fn add_loop(
        &mut self,
        id: impl Into<NodeId>,
        controller: BoundedLoop<S>,
        on_complete: impl Into<NodeId>,
    ) -> &mut Self {
        let id = id.into();
        let router = controller.router();
        self.insert(id.clone(), Arc::new(controller));
        self.add_conditional_edge(
            id.clone(),
            router,
            [(LoopRoute::Continue, id), (LoopRoute::Completed, on_complete.into())],
        )
    }

    /// Add an unconditional transition
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let from = from.into();
        if let Err(e) = self.graph.add_edge(from, Edge::Direct(to.into())) {
            self.errors.push(e);
        }
        self
    }

    /// Add a router-selected transition
    ///
    /// `branches` maps labels to destinations. Labels the router can return but
    /// that are missing here make `compile()` fail.
    pub fn add_conditional_edge<R, I, T>(&mut self, from: impl Into<NodeId>, router: R, branches: I) -> &mut Self
    where
        R: Router<S> + 'static,
        I: IntoIterator<Item = (R::Label, T)>,
        T: Into<NodeId>,
    {
        let from = from.into();

        let mut mapped: HashMap<&'static str, NodeId> = HashMap::new();
        for (label, to) in branches {
            if mapped.insert(label.as_str(), to.into()).is_some() {
                self.errors
                    .push(format!("Router on '{}' maps label '{}' twice", from, label.as_str()));
            }
        }

        let route: RouteFn<S> = Arc::new(move |state: &S| router.route(state).as_str());
        let edge = Edge::Conditional {
            router: route,
            labels: R::Label::variants().iter().map(RouteLabel::as_str).collect(),
            branches: mapped,
        };

        if let Err(e) = self.graph.add_edge(from, edge) {
            self.errors.push(e);
        }
        self
    }

    /// Add a router-selected transition from a plain closure
    pub fn add_conditional_edge_fn<L, F, I, T>(&mut self, from: impl Into<NodeId>, router: F, branches: I) -> &mut Self
    where
        L: RouteLabel,
        F: Fn(&S) -> L + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        T: Into<NodeId>,
    {
        self.add_conditional_edge(from, FnRouter::new(router), branches)
    }

    /// Set the first stage to execute
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.set_entry(node.into());
        self
    }

    /// Name of the entry stage, if set
    pub fn entry(&self) -> Option<&str> {
        self.graph.entry.as_deref()
    }

    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    /// Validate and hand back the raw graph
    pub fn build(self) -> Result<Graph<S>> {
        if !self.errors.is_empty() {
            return Err(GraphError::Validation(self.errors.join("; ")));
        }
        self.graph.validate().map_err(GraphError::Validation)?;
        Ok(self.graph)
    }

    /// Validate and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let graph = self.build()?;
        Ok(CompiledGraph::new(graph))
    }

    /// Hand back the raw graph and any construction errors without validating
    pub(crate) fn into_parts(self) -> (Graph<S>, Vec<String>) {
        (self.graph, self.errors)
    }

    fn insert(&mut self, name: NodeId, stage: Arc<dyn Stage<S>>) {
        let kind = stage.kind();
        if let Err(e) = self.graph.add_node(NodeSpec { name, stage, kind }) {
            self.errors.push(e);
        }
    }
}

impl<S: WorkflowState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Passthrough, StageKind};
    use crate::state::ControlState;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Triage {
        Low,
        Medium,
        High,
    }

    impl RouteLabel for Triage {
        fn variants() -> &'static [Self] {
            &[Triage::Low, Triage::Medium, Triage::High]
        }

        fn as_str(&self) -> &'static str {
            match self {
                Triage::Low => "low",
                Triage::Medium => "medium",
                Triage::High => "high",
            }
        }
    }

    fn validation_message(graph: StateGraph<ControlState>) -> String {
        match graph.compile() {
            Err(GraphError::Validation(msg)) => msg,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("graph should not compile"),
        }
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_stage("a", Passthrough::new("a"))
            .add_stage("a", Passthrough::new("a"))
            .add_edge("a", END)
            .set_entry("a");
        assert!(validation_message(graph).contains("Duplicate stage name 'a'"));
    }

    #[test]
    fn test_unhandled_router_label_rejected() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_stage("triage", Passthrough::new("triage"))
            .add_stage("fast", Passthrough::new("fast"))
            .add_conditional_edge_fn(
                "triage",
                |_: &ControlState| Triage::Low,
                [(Triage::Low, "fast"), (Triage::High, END)],
            )
            .add_edge("fast", END)
            .set_entry("triage");
        assert!(validation_message(graph).contains("label 'medium'"));
    }

    #[test]
    fn test_label_mapped_twice_rejected() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_stage("triage", Passthrough::new("triage"))
            .add_conditional_edge_fn(
                "triage",
                |_: &ControlState| Triage::Low,
                [(Triage::Low, END), (Triage::Medium, END), (Triage::High, END), (Triage::Low, END)],
            )
            .set_entry("triage");
        assert!(validation_message(graph).contains("twice"));
    }

    #[test]
    fn test_edge_to_undeclared_stage_rejected() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_stage("a", Passthrough::new("a"))
            .add_edge("a", "nowhere")
            .set_entry("a");
        assert!(validation_message(graph).contains("'nowhere'"));
    }

    #[test]
    fn test_gate_wires_both_labels() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_gate(Gate::preseeded("approve", true), "publish")
            .add_stage("publish", Passthrough::new("publish"))
            .add_edge("publish", END)
            .set_entry("approve");

        let built = graph.build().unwrap();
        match &built.edges["approve"] {
            Edge::Conditional { branches, .. } => {
                assert_eq!(branches["continue"], "publish");
                assert_eq!(branches["terminate"], END);
            }
            other => panic!("unexpected edge {other:?}"),
        }
        assert_eq!(built.nodes["approve"].kind, StageKind::Gate);
    }

    #[test]
    fn test_loop_wires_self_edge() {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_loop("search", BoundedLoop::new("acme", 3, Passthrough::new("search")), "model")
            .add_stage("model", Passthrough::new("model"))
            .add_edge("model", END)
            .set_entry("search");

        let built = graph.build().unwrap();
        match &built.edges["search"] {
            Edge::Conditional { branches, labels, .. } => {
                assert_eq!(labels, &vec!["continue_search", "fully_completed"]);
                assert_eq!(branches["continue_search"], "search");
                assert_eq!(branches["fully_completed"], "model");
            }
            other => panic!("unexpected edge {other:?}"),
        }
        assert_eq!(built.nodes["search"].kind, StageKind::Loop);
    }

    #[test]
    fn test_missing_entry_rejected() {
        let mut graph = StateGraph::<ControlState>::new();
        graph.add_stage("a", Passthrough::new("a")).add_edge("a", END);
        assert!(validation_message(graph).contains("entry"));
    }
}
