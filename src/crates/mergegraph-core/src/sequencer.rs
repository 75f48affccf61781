//! Sequential composition of sub-graphs
//!
//! A [`Segment`] is a self-contained sub-graph with one entry and one exit
//! stage, where the exit's only transition is to [`END`]. The [`Sequencer`]
//! chains segments into one linear pipeline by rewiring each segment's exit to
//! the next segment's entry:
//!
//! ```text
//!  segment "entity_a"            segment "entity_b"            segment "merger"
//!  entry ─ ... ─ exit ──────────▶ entry ─ ... ─ exit ──────────▶ entry ─ ... ─ exit ─▶ END
//!            │                             │
//!            └─ gate "terminate" ─▶ END    └─ gate "terminate" ─▶ END
//! ```
//!
//! Other transitions to END inside a segment (declined gates) are left alone, so
//! declining anywhere still ends the whole run. Segments never interleave:
//! everything in one segment that runs, runs before the next segment's entry.

use crate::builder::StateGraph;
use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeId, END};
use crate::state::WorkflowState;

/// Named sub-graph with a designated exit stage
pub struct Segment<S: WorkflowState> {
    name: String,
    graph: StateGraph<S>,
    exit: NodeId,
}

impl<S: WorkflowState> Segment<S> {
    /// Wrap a builder whose `exit` stage transitions to END
    pub fn new(name: impl Into<String>, graph: StateGraph<S>, exit: impl Into<NodeId>) -> Self {
        Self {
            name: name.into(),
            graph,
            exit: exit.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exit(&self) -> &str {
        &self.exit
    }

    pub fn entry(&self) -> Option<&str> {
        self.graph.entry()
    }
}

/// Builds one linear pipeline out of segments
pub struct Sequencer<S: WorkflowState> {
    segments: Vec<Segment<S>>,
}

impl<S: WorkflowState> Sequencer<S> {
    pub fn new() -> Self {
        Self { segments: Vec::new() }
    }

    /// Append a segment after the ones already added
    pub fn then(mut self, segment: Segment<S>) -> Self {
        self.segments.push(segment);
        self
    }

    /// Segment names in execution order
    pub fn segment_names(&self) -> Vec<&str> {
        self.segments.iter().map(Segment::name).collect()
    }

    /// Merge all segments into one validated graph
    pub fn build(self) -> Result<Graph<S>> {
        if self.segments.is_empty() {
            return Err(GraphError::Validation("Sequencer has no segments".to_string()));
        }

        let mut merged: Graph<S> = Graph::new();
        let mut errors = Vec::new();
        let mut previous_exit: Option<NodeId> = None;

        for segment in self.segments {
            let Segment { name, graph, exit } = segment;
            let (graph, segment_errors) = graph.into_parts();
            errors.extend(segment_errors.into_iter().map(|e| format!("segment '{}': {}", name, e)));

            let Some(entry) = graph.entry.clone() else {
                errors.push(format!("segment '{}' has no entry point", name));
                continue;
            };

            match graph.edges.get(&exit) {
                Some(Edge::Direct(to)) if to == END => {}
                _ => errors.push(format!(
                    "segment '{}' exit '{}' must have a single transition to END",
                    name, exit
                )),
            }

            merge_into(&mut merged, graph, &name, &mut errors);

            match previous_exit.take() {
                Some(prev) => {
                    merged.replace_edge(&prev, Edge::Direct(entry));
                }
                None => merged.set_entry(entry),
            }
            previous_exit = Some(exit);
        }

        if !errors.is_empty() {
            return Err(GraphError::Validation(errors.join("; ")));
        }
        merged.validate().map_err(GraphError::Validation)?;
        Ok(merged)
    }

    /// Merge, validate and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        Ok(CompiledGraph::new(self.build()?))
    }
}

impl<S: WorkflowState> Default for Sequencer<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_into<S>(merged: &mut Graph<S>, mut graph: Graph<S>, segment: &str, errors: &mut Vec<String>) {
    for name in std::mem::take(&mut graph.order) {
        if let Some(spec) = graph.nodes.remove(&name) {
            if let Err(e) = merged.add_node(spec) {
                errors.push(format!("segment '{}': {}", segment, e));
            }
        }
    }
    for (from, edge) in graph.edges {
        if let Err(e) = merged.add_edge(from, edge) {
            errors.push(format!("segment '{}': {}", segment, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::stage::{Passthrough, StageFuture};
    use crate::state::ControlState;
    use crate::trace::Termination;

    #[derive(Debug, Clone, Default)]
    struct Log {
        control: ControlState,
        calls: Vec<String>,
    }

    impl WorkflowState for Log {
        fn control(&self) -> &ControlState {
            &self.control
        }

        fn control_mut(&mut self) -> &mut ControlState {
            &mut self.control
        }
    }

    fn record(name: String) -> impl Fn(Log) -> StageFuture<Log> + Send + Sync + 'static {
        move |mut state: Log| -> StageFuture<Log> {
            let name = name.clone();
            Box::pin(async move {
                state.calls.push(name);
                Ok(state)
            })
        }
    }

    fn entity_segment(suffix: &str, approve: bool) -> Segment<Log> {
        let research = format!("research_{suffix}");
        let gate = format!("approval_{suffix}");
        let report = format!("report_{suffix}");

        let mut graph = StateGraph::new();
        graph
            .add_node(research.clone(), record(research.clone()))
            .add_gate(Gate::preseeded(gate.clone(), approve), report.clone())
            .add_node(report.clone(), record(report.clone()))
            .add_edge(research.clone(), gate)
            .add_edge(report.clone(), END)
            .set_entry(research);
        Segment::new(format!("entity_{suffix}"), graph, report)
    }

    fn tail_segment() -> Segment<Log> {
        let mut graph = StateGraph::new();
        graph
            .add_node("merge", record("merge".into()))
            .add_stage("finalize", Passthrough::new("finalize"))
            .add_edge("merge", "finalize")
            .add_edge("finalize", END)
            .set_entry("merge");
        Segment::new("merger", graph, "finalize")
    }

    #[tokio::test]
    async fn test_segments_run_strictly_in_order() {
        let compiled = Sequencer::new()
            .then(entity_segment("a", true))
            .then(entity_segment("b", true))
            .then(tail_segment())
            .compile()
            .unwrap();

        let report = compiled.invoke_with_report(Log::default()).await.unwrap();
        assert_eq!(
            report.state.calls,
            vec!["research_a", "report_a", "research_b", "report_b", "merge"]
        );
        let last_a = report.trace.last_position("report_a").unwrap();
        let first_b = report.trace.first_position("research_b").unwrap();
        assert!(last_a < first_b);
        assert_eq!(report.termination, Termination::Completed);
    }

    #[tokio::test]
    async fn test_declined_gate_in_first_segment_ends_pipeline() {
        let compiled = Sequencer::new()
            .then(entity_segment("a", false))
            .then(entity_segment("b", true))
            .compile()
            .unwrap();

        let report = compiled.invoke_with_report(Log::default()).await.unwrap();
        assert_eq!(report.state.calls, vec!["research_a"]);
        assert!(report.declined());
    }

    #[test]
    fn test_name_collision_across_segments_rejected() {
        let result = Sequencer::new()
            .then(entity_segment("a", true))
            .then(entity_segment("a", true))
            .build();
        match result {
            Err(GraphError::Validation(msg)) => assert!(msg.contains("Duplicate stage name"), "{msg}"),
            other => panic!("unexpected result: {:?}", other.map(|g| g.order)),
        }
    }

    #[test]
    fn test_exit_must_lead_to_end() {
        let mut graph = StateGraph::<Log>::new();
        graph
            .add_stage("a", Passthrough::new("a"))
            .add_stage("b", Passthrough::new("b"))
            .add_edge("a", "b")
            .add_edge("b", END)
            .set_entry("a");
        let result = Sequencer::new().then(Segment::new("bad", graph, "a")).build();
        assert!(matches!(result, Err(GraphError::Validation(msg)) if msg.contains("exit 'a'")));
    }

    #[test]
    fn test_empty_sequencer_rejected() {
        assert!(Sequencer::<Log>::new().build().is_err());
    }
}
