//! Diagram export for workflow graphs
//!
//! Renders a [`Graph`] as Mermaid or Graphviz DOT text. Output is deterministic:
//! stages appear in declaration order and conditional branches in the router's
//! label order, so diagrams can be diffed between versions.
//!
//! - Entry and END are drawn as circles
//! - Gates are diamonds, bounded loops are hexagons, plain stages are boxes
//! - Conditional transitions are dashed and labelled with the route label
//!
//! ```rust
//! use mergegraph_core::visualization::{visualize, DiagramFormat};
//! use mergegraph_core::{ControlState, Gate, Passthrough, StateGraph, END};
//!
//! let mut graph = StateGraph::<ControlState>::new();
//! graph
//!     .add_gate(Gate::preseeded("approve", true), "publish")
//!     .add_stage("publish", Passthrough::new("publish"))
//!     .add_edge("publish", END)
//!     .set_entry("approve");
//! let compiled = graph.compile().unwrap();
//!
//! let mermaid = visualize(compiled.graph(), DiagramFormat::Mermaid);
//! assert!(mermaid.contains("approve -.\"continue\".-> publish"));
//! ```

use crate::graph::{Edge, Graph, END, START};
use crate::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    #[default]
    Mermaid,
    Dot,
}

impl FromStr for DiagramFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mermaid" => Ok(DiagramFormat::Mermaid),
            "dot" | "graphviz" => Ok(DiagramFormat::Dot),
            other => Err(format!("Unknown diagram format '{}'", other)),
        }
    }
}

/// Render `graph` in the requested format
pub fn visualize<S>(graph: &Graph<S>, format: DiagramFormat) -> String {
    match format {
        DiagramFormat::Mermaid => visualize_mermaid(graph),
        DiagramFormat::Dot => visualize_dot(graph),
    }
}

/// Outgoing transitions of `from` as (label, target) pairs, in label order
fn transitions<S>(graph: &Graph<S>, from: &str) -> Vec<(Option<&'static str>, String)> {
    match graph.edges.get(from) {
        Some(Edge::Direct(to)) => vec![(None, to.clone())],
        Some(Edge::Conditional { labels, branches, .. }) => labels
            .iter()
            .filter_map(|label| branches.get(label).map(|to| (Some(*label), to.clone())))
            .collect(),
        None => Vec::new(),
    }
}

fn visualize_mermaid<S>(graph: &Graph<S>) -> String {
    let mut out = String::from("graph TD\n");

    let _ = writeln!(out, "    {}((START))", sanitize_id(START));
    let _ = writeln!(out, "    {}((END))", sanitize_id(END));

    for spec in graph.nodes_in_order() {
        let id = sanitize_id(&spec.name);
        let label = escape_mermaid(&spec.name);
        let _ = match spec.kind {
            StageKind::Task => writeln!(out, "    {}[\"{}\"]", id, label),
            StageKind::Gate => writeln!(out, "    {}{{\"{}\"}}", id, label),
            StageKind::Loop => writeln!(out, "    {}{{{{\"{}\"}}}}", id, label),
        };
    }

    if let Some(entry) = &graph.entry {
        let _ = writeln!(out, "    {} --> {}", sanitize_id(START), sanitize_id(entry));
    }

    for from in &graph.order {
        for (label, to) in transitions(graph, from) {
            let _ = match label {
                None => writeln!(out, "    {} --> {}", sanitize_id(from), sanitize_id(&to)),
                Some(label) => writeln!(
                    out,
                    "    {} -.\"{}\".-> {}",
                    sanitize_id(from),
                    escape_mermaid(label),
                    sanitize_id(&to)
                ),
            };
        }
    }

    out.push_str("    classDef gate fill:#FFE4B5,stroke:#FF8C00,stroke-width:2px\n");
    out.push_str("    classDef loop fill:#ADD8E6,stroke:#4682B4,stroke-width:2px\n");
    let _ = writeln!(
        out,
        "    style {} fill:#90EE90,stroke:#228B22,stroke-width:3px",
        sanitize_id(START)
    );
    let _ = writeln!(
        out,
        "    style {} fill:#FFB6C1,stroke:#DC143C,stroke-width:3px",
        sanitize_id(END)
    );

    for spec in graph.nodes_in_order() {
        let class = match spec.kind {
            StageKind::Gate => "gate",
            StageKind::Loop => "loop",
            StageKind::Task => continue,
        };
        let _ = writeln!(out, "    class {} {}", sanitize_id(&spec.name), class);
    }

    out
}

fn visualize_dot<S>(graph: &Graph<S>) -> String {
    let mut out = String::from("digraph workflow {\n");
    out.push_str("    rankdir=TB;\n");
    out.push_str("    node [shape=box, style=rounded];\n");
    let _ = writeln!(out, "    \"{}\" [label=\"START\", shape=circle, style=filled, fillcolor=palegreen];", START);
    let _ = writeln!(out, "    \"{}\" [label=\"END\", shape=doublecircle, style=filled, fillcolor=pink];", END);

    for spec in graph.nodes_in_order() {
        let attrs = match spec.kind {
            StageKind::Task => "",
            StageKind::Gate => ", shape=diamond, style=filled, fillcolor=moccasin",
            StageKind::Loop => ", shape=hexagon, style=filled, fillcolor=lightblue",
        };
        let _ = writeln!(out, "    \"{}\" [label=\"{}\"{}];", escape_dot(&spec.name), escape_dot(&spec.name), attrs);
    }

    if let Some(entry) = &graph.entry {
        let _ = writeln!(out, "    \"{}\" -> \"{}\";", START, escape_dot(entry));
    }

    for from in &graph.order {
        for (label, to) in transitions(graph, from) {
            let _ = match label {
                None => writeln!(out, "    \"{}\" -> \"{}\";", escape_dot(from), escape_dot(&to)),
                Some(label) => writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [label=\"{}\", style=dashed];",
                    escape_dot(from),
                    escape_dot(&to),
                    escape_dot(label)
                ),
            };
        }
    }

    out.push_str("}\n");
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Mermaid ids must be alphanumeric plus underscore, and lowercase `end` is a keyword
fn sanitize_id(s: &str) -> String {
    if s == START {
        return "START".to_string();
    }
    if s == END {
        return "END".to_string();
    }
    let trimmed = s.trim_matches('_');
    let id: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if id.is_empty() {
        "node".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateGraph;
    use crate::gate::Gate;
    use crate::loop_control::BoundedLoop;
    use crate::stage::Passthrough;
    use crate::state::ControlState;

    fn sample() -> Graph<ControlState> {
        let mut graph = StateGraph::<ControlState>::new();
        graph
            .add_loop("web_search_a", BoundedLoop::new("a", 26, Passthrough::new("web_search_a")), "approve")
            .add_gate(Gate::preseeded("approve", true), "report")
            .add_stage("report", Passthrough::new("report"))
            .add_edge("report", END)
            .set_entry("web_search_a");
        graph.build().unwrap()
    }

    #[test]
    fn test_mermaid_shapes_and_labels() {
        let out = visualize(&sample(), DiagramFormat::Mermaid);
        assert!(out.starts_with("graph TD\n"));
        assert!(out.contains("START((START))"));
        assert!(out.contains("START --> web_search_a"));
        assert!(out.contains("web_search_a{{\"web_search_a\"}}"));
        assert!(out.contains("approve{\"approve\"}"));
        assert!(out.contains("report[\"report\"]"));
        assert!(out.contains("web_search_a -.\"continue_search\".-> web_search_a"));
        assert!(out.contains("web_search_a -.\"fully_completed\".-> approve"));
        assert!(out.contains("approve -.\"terminate\".-> END"));
        assert!(out.contains("class approve gate"));
    }

    #[test]
    fn test_dot_output() {
        let out = visualize(&sample(), DiagramFormat::Dot);
        assert!(out.starts_with("digraph workflow {"));
        assert!(out.contains("\"approve\" -> \"report\" [label=\"continue\", style=dashed];"));
        assert!(out.contains("\"report\" -> \"__end__\";"));
        assert!(out.trim_end().ends_with('}'));
    }

    #[test]
    fn test_output_is_deterministic() {
        let graph = sample();
        assert_eq!(
            visualize(&graph, DiagramFormat::Mermaid),
            visualize(&graph, DiagramFormat::Mermaid)
        );
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("DOT".parse::<DiagramFormat>().unwrap(), DiagramFormat::Dot);
        assert_eq!("mermaid".parse::<DiagramFormat>().unwrap(), DiagramFormat::Mermaid);
        assert!("svg".parse::<DiagramFormat>().is_err());
    }
}
