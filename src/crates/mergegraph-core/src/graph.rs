//! Core graph data structures
//!
//! A [`Graph`] holds the named stages of a workflow, exactly one outgoing
//! transition per stage, and the entry point. It is produced by
//! [`StateGraph`](crate::StateGraph) (or by the [`Sequencer`](crate::Sequencer)
//! from several segments) and consumed by [`CompiledGraph`](crate::CompiledGraph).
//!
//! ```text
//!   entry
//!     │
//!     ▼
//! ┌────────┐  Direct   ┌────────┐  Conditional  ┌────────┐
//! │ stage  │──────────▶│  gate  │──"continue"──▶│ stage  │──▶ END
//! └────────┘           └────┬───┘               └────────┘
//!                           │ "terminate"
//!                           ▼
//!                          END
//! ```
//!
//! Conditional transitions keep the full label set of their router, so
//! [`Graph::validate`] can reject a router whose labels are not all mapped to
//! a destination.

use crate::stage::{Stage, StageKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Node identifier type
pub type NodeId = String;

/// Reserved name of the virtual start node (used only in diagrams)
pub const START: &str = "__start__";

/// Reserved name of the terminal sentinel
pub const END: &str = "__end__";

/// Type-erased router: returns the textual name of the chosen label
pub type RouteFn<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

/// A named stage in the graph
pub struct NodeSpec<S> {
    /// Unique stage name
    pub name: NodeId,
    /// Handler applied when the runner reaches this node
    pub stage: Arc<dyn Stage<S>>,
    /// Structural role, cached from the handler
    pub kind: StageKind,
}

impl<S> Clone for NodeSpec<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stage: self.stage.clone(),
            kind: self.kind,
        }
    }
}

impl<S> fmt::Debug for NodeSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Outgoing transition of a node
pub enum Edge<S> {
    /// Unconditional successor
    Direct(NodeId),

    /// Router-selected successor
    Conditional {
        /// Router returning a label name
        router: RouteFn<S>,
        /// Every label the router can produce, in declaration order
        labels: Vec<&'static str>,
        /// Label name to destination node
        branches: HashMap<&'static str, NodeId>,
    },
}

impl<S> Edge<S> {
    /// Every destination this edge can lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { labels, branches, .. } => labels
                .iter()
                .filter_map(|label| branches.get(label).map(String::as_str))
                .collect(),
        }
    }
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Direct(to) => Edge::Direct(to.clone()),
            Edge::Conditional {
                router,
                labels,
                branches,
            } => Edge::Conditional {
                router: router.clone(),
                labels: labels.clone(),
                branches: branches.clone(),
            },
        }
    }
}

impl<S> fmt::Debug for Edge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { labels, branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("labels", labels)
                .field("branches", branches)
                .finish(),
        }
    }
}

/// Stages, transitions and entry point of a workflow
pub struct Graph<S> {
    /// All nodes mapped by name
    pub nodes: HashMap<NodeId, NodeSpec<S>>,
    /// Node names in insertion order
    pub order: Vec<NodeId>,
    /// Outgoing transition per node
    pub edges: HashMap<NodeId, Edge<S>>,
    /// First node executed
    pub entry: Option<NodeId>,
}

impl<S> Graph<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            entry: None,
        }
    }

    /// Insert a node, refusing duplicate and reserved names
    pub fn add_node(&mut self, spec: NodeSpec<S>) -> Result<(), String> {
        if spec.name == START || spec.name == END {
            return Err(format!("Node name '{}' is reserved", spec.name));
        }
        if self.nodes.contains_key(&spec.name) {
            return Err(format!("Duplicate stage name '{}'", spec.name));
        }
        self.order.push(spec.name.clone());
        self.nodes.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Set the outgoing transition of `from`, refusing a second one
    pub fn add_edge(&mut self, from: NodeId, edge: Edge<S>) -> Result<(), String> {
        if self.edges.contains_key(&from) {
            return Err(format!("Stage '{}' already has an outgoing transition", from));
        }
        self.edges.insert(from, edge);
        Ok(())
    }

    /// Replace the outgoing transition of `from`
    pub fn replace_edge(&mut self, from: &str, edge: Edge<S>) -> Option<Edge<S>> {
        self.edges.insert(from.to_string(), edge)
    }

    pub fn set_entry(&mut self, node: NodeId) {
        self.entry = Some(node);
    }

    /// Nodes in insertion order
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &NodeSpec<S>> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    /// Nodes whose every outgoing path leads straight to [`END`]
    pub fn terminal_nodes(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| {
                self.edges
                    .get(name.as_str())
                    .map_or(false, |edge| edge.targets().iter().all(|to| *to == END))
            })
            .map(String::as_str)
            .collect()
    }

    fn exists(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Validate the graph structure
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No entry point is set, or it names an undeclared stage
    /// - Any edge source or target is undeclared (END is always a valid target)
    /// - A conditional edge leaves one of its router's labels unmapped
    /// - A stage has no outgoing transition
    /// - A stage cannot be reached from the entry point
    pub fn validate(&self) -> Result<(), String> {
        let entry = self
            .entry
            .as_deref()
            .ok_or_else(|| "No entry point set".to_string())?;
        if !self.exists(entry) {
            return Err(format!("Entry point '{}' does not exist", entry));
        }

        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.exists(from) {
                return Err(format!("Edge source '{}' does not exist", from));
            }

            match &self.edges[from] {
                Edge::Direct(to) => {
                    if !self.exists(to) && to != END {
                        return Err(format!("Edge target '{}' (from '{}') does not exist", to, from));
                    }
                }
                Edge::Conditional { labels, branches, .. } => {
                    for label in labels {
                        match branches.get(label) {
                            None => {
                                return Err(format!(
                                    "Router on '{}' has no destination for label '{}'",
                                    from, label
                                ));
                            }
                            Some(to) if !self.exists(to) && to != END => {
                                return Err(format!(
                                    "Branch target '{}' (label '{}' on '{}') does not exist",
                                    to, label, from
                                ));
                            }
                            Some(_) => {}
                        }
                    }
                    if let Some(extra) = branches.keys().find(|key| !labels.contains(key)) {
                        return Err(format!(
                            "Router on '{}' maps unknown label '{}'",
                            from, extra
                        ));
                    }
                }
            }
        }

        for name in &self.order {
            if !self.edges.contains_key(name) {
                return Err(format!(
                    "Stage '{}' has no outgoing transition (add an edge to END if it is terminal)",
                    name
                ));
            }
        }

        let reachable = self.reachable_from(entry);
        if let Some(orphan) = self.order.iter().find(|name| !reachable.contains(name.as_str())) {
            return Err(format!("Stage '{}' is unreachable from '{}'", orphan, entry));
        }

        Ok(())
    }

    fn reachable_from<'a>(&'a self, entry: &'a str) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry]);
        while let Some(node) = queue.pop_front() {
            if node == END || !seen.insert(node) {
                continue;
            }
            if let Some(edge) = self.edges.get(node) {
                queue.extend(edge.targets());
            }
        }
        seen
    }
}

impl<S> Default for Graph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for Graph<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            order: self.order.clone(),
            edges: self.edges.clone(),
            entry: self.entry.clone(),
        }
    }
}

impl<S> fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("order", &self.order)
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Passthrough;
    use crate::state::ControlState;

    fn node(name: &str) -> NodeSpec<ControlState> {
        NodeSpec {
            name: name.to_string(),
            stage: Arc::new(Passthrough::new(name)),
            kind: StageKind::Task,
        }
    }

    fn conditional(labels: &[&'static str], branches: &[(&'static str, &str)]) -> Edge<ControlState> {
        Edge::Conditional {
            router: Arc::new(|_: &ControlState| "yes"),
            labels: labels.to_vec(),
            branches: branches.iter().map(|(l, t)| (*l, t.to_string())).collect(),
        }
    }

    #[test]
    fn test_linear_graph_is_valid() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b")).unwrap();
        graph.add_edge("a".into(), Edge::Direct("b".into())).unwrap();
        graph.add_edge("b".into(), Edge::Direct(END.into())).unwrap();
        graph.set_entry("a".into());

        assert!(graph.validate().is_ok());
        assert_eq!(graph.terminal_nodes(), vec!["b"]);
    }

    #[test]
    fn test_duplicate_and_reserved_names_rejected() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        assert!(graph.add_node(node("a")).unwrap_err().contains("Duplicate"));
        assert!(graph.add_node(node(END)).unwrap_err().contains("reserved"));
    }

    #[test]
    fn test_missing_entry() {
        let mut graph = Graph::<ControlState>::new();
        assert_eq!(graph.validate().unwrap_err(), "No entry point set");
        graph.set_entry("ghost".into());
        assert!(graph.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_undeclared_target() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_edge("a".into(), Edge::Direct("ghost".into())).unwrap();
        graph.set_entry("a".into());
        assert!(graph.validate().unwrap_err().contains("'ghost'"));
    }

    #[test]
    fn test_unmapped_label_rejected() {
        let mut graph = Graph::new();
        graph.add_node(node("gate")).unwrap();
        graph.add_node(node("next")).unwrap();
        graph
            .add_edge("gate".into(), conditional(&["yes", "no"], &[("yes", "next")]))
            .unwrap();
        graph.add_edge("next".into(), Edge::Direct(END.into())).unwrap();
        graph.set_entry("gate".into());

        let err = graph.validate().unwrap_err();
        assert!(err.contains("no destination for label 'no'"), "{err}");
    }

    #[test]
    fn test_dangling_stage_rejected() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.set_entry("a".into());
        assert!(graph.validate().unwrap_err().contains("no outgoing transition"));
    }

    #[test]
    fn test_unreachable_stage_rejected() {
        let mut graph = Graph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("island")).unwrap();
        graph.add_edge("a".into(), Edge::Direct(END.into())).unwrap();
        graph.add_edge("island".into(), Edge::Direct(END.into())).unwrap();
        graph.set_entry("a".into());
        assert!(graph.validate().unwrap_err().contains("unreachable"));
    }

    #[test]
    fn test_second_outgoing_edge_rejected() {
        let mut graph = Graph::<ControlState>::new();
        graph.add_edge("a".into(), Edge::Direct(END.into())).unwrap();
        assert!(graph.add_edge("a".into(), Edge::Direct("b".into())).is_err());
    }
}
