//! End-to-end runs of the deal workflow with scripted collaborators

mod common;

use async_trait::async_trait;
use common::{collaborators, initial_state, workflow, workspace, ScriptedModel};
use mergegraph_agents::{ArtifactKind, DealState, DealWorkflow, EntitySlot, GatePolicy, NO_INFORMATION};
use mergegraph_core::{
    ApprovalProvider, CheckpointSaver, GraphError, InMemoryCheckpointSaver, Termination, WorkflowState,
};
use std::sync::{Arc, Mutex};

const TWO_QUERIES: &str = "1. revenue outlook\n2. supplier risks";

#[tokio::test]
async fn test_full_run_reaches_report_formatter() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.trace.count("web_search_a"), 2);
    assert_eq!(report.trace.count("web_search_b"), 2);
    assert_eq!(report.state.control().current_step().to_string(), "report_formatter");
    assert!(report.state.control().error().is_none());

    for slot in EntitySlot::ALL {
        let artifacts = report.state.artifacts(slot);
        assert_eq!(artifacts.search_results.len(), 2);
        assert!(artifacts.financial_report.starts_with("Financial Report:"));
        assert!(artifacts.operations_report.starts_with("Operations Report:"));
        assert!(artifacts.report_files[&ArtifactKind::FinancialReport].exists());
        // Both fetched results were folded into the company's index
        assert_eq!(report.state.index(slot).unwrap().documents(), 3);
    }

    assert!(dir.path().join("report/Acme_financial_report.txt").exists());
    assert!(dir.path().join("report/Globex_operations_report.txt").exists());
    for file in ["merger_valuation_report", "legal_report", "final_report"] {
        let path = dir.path().join(format!("merger_reports/{}.txt", file));
        assert!(path.exists(), "missing {}", path.display());
    }
    assert!(!report.state.final_report.sections.is_empty());
    assert!(!report.state.merger.valuation.is_empty());
    assert!(!report.state.legal.legal_risks.is_empty());
}

#[tokio::test]
async fn test_segments_run_in_order() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();
    let trace = &report.trace;
    let pos = |node: &str| trace.first_position(node).unwrap_or_else(|| panic!("{} never ran", node));

    let last_a = trace
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| node.ends_with("_a"))
        .map(|(i, _)| i)
        .max()
        .unwrap();
    assert!(last_a < pos("generate_queries_b"));
    assert!(pos("operations_reporting_b") < pos("validate_merger_feasibility"));
    assert!(pos("finalize_merger_report") < pos("assess_regulatory_compliance"));
    assert!(pos("finalize_legal_report") < pos("report_structure_creator"));
    assert_eq!(trace.last().unwrap().node, "report_formatter");
    assert_eq!(trace.nodes()[0], "generate_queries_a");
}

#[tokio::test]
async fn test_declined_gate_ends_run_with_partial_state() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let gates = GatePolicy::approve_all().with_decision("fin_human_approval_b", false);
    let graph = workflow(&dir, collaborators, gates).compile("Acme", "Globex").unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(
        report.termination,
        Termination::GateDeclined {
            node: "fin_human_approval_b".to_string()
        }
    );
    assert!(report.declined());
    assert!(report
        .state
        .control()
        .current_step()
        .to_string()
        .starts_with("fin_human_approval_b"));
    assert!(report.state.artifacts(EntitySlot::A).operations_report.starts_with("Operations Report:"));
    let globex = report.state.artifacts(EntitySlot::B);
    assert!(globex.dcf_model.starts_with("DCF Model:"));
    assert!(globex.financial_report.is_empty());
    assert_eq!(report.trace.count("validate_merger_feasibility"), 0);
    assert!(!dir.path().join("merger_reports").exists());
}

#[tokio::test]
async fn test_rejecting_research_skips_everything() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::reject_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(report.trace.nodes(), vec!["generate_queries_a", "research_human_approval_a"]);
    assert!(report.declined());
    assert_eq!(report.state.control().pending("Acme").count(), 2);
}

#[tokio::test]
async fn test_company_failure_degrades_without_touching_the_other() {
    let dir = workspace();
    let model = ScriptedModel::new(TWO_QUERIES).failing_on("cash flow view of Acme");
    let collaborators = collaborators(Arc::new(model));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.state.control().current_step().to_string(), "report_formatter");
    assert_eq!(report.state.artifacts(EntitySlot::A).dcf_model, NO_INFORMATION);
    assert!(report.state.artifacts(EntitySlot::A).financial_ratios.starts_with("Financial Ratios:"));
    assert!(report.state.artifacts(EntitySlot::B).dcf_model.starts_with("DCF Model:"));
    assert!(report.state.control().error().unwrap().starts_with("DCF_modelling_a:"));
}

#[tokio::test]
async fn test_entity_stages_leave_other_company_untouched() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let initial = state.clone();
    let saver: Arc<InMemoryCheckpointSaver<DealState>> = Arc::new(InMemoryCheckpointSaver::new());
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .with_checkpointer(saver.clone())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();
    let checkpoints = saver.list(report.run_id).await.unwrap();
    assert_eq!(checkpoints.len(), report.steps());

    for checkpoint in checkpoints.iter().filter(|c| c.node.ends_with("_a")) {
        assert_eq!(checkpoint.state.artifacts(EntitySlot::B), initial.artifacts(EntitySlot::B));
        assert_eq!(checkpoint.state.index(EntitySlot::B), initial.index(EntitySlot::B));
    }

    let acme_done = checkpoints
        .iter()
        .find(|c| c.node == "operations_reporting_a")
        .unwrap();
    for checkpoint in checkpoints.iter().filter(|c| c.node.ends_with("_b")) {
        assert_eq!(
            checkpoint.state.artifacts(EntitySlot::A),
            acme_done.state.artifacts(EntitySlot::A)
        );
    }
}

#[tokio::test]
async fn test_search_loop_stops_at_ceiling() {
    let dir = workspace();
    let queries: String = (1..=40).map(|i| format!("{}. topic number {}\n", i, i)).collect();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(&queries)));
    let state = initial_state(&dir, &collaborators).await;
    // Query cap above the loop ceiling
    let ctx = workflow(&dir, collaborators, GatePolicy::approve_all())
        .context()
        .clone()
        .with_max_queries(100);
    let graph = DealWorkflow::new(ctx, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(report.trace.count("web_search_a"), 26);
    assert_eq!(report.trace.count("web_search_b"), 26);
    assert_eq!(report.state.control().iteration("Acme"), 26);
    assert_eq!(report.state.control().pending("Acme").count(), 14);
    assert_eq!(report.state.artifacts(EntitySlot::A).search_results.len(), 26);
    assert_eq!(report.termination, Termination::Completed);
}

#[tokio::test]
async fn test_empty_query_list_runs_one_search_pass() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new("")));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    assert_eq!(report.trace.count("web_search_a"), 1);
    assert!(report.state.artifacts(EntitySlot::A).search_results.is_empty());
    assert_eq!(report.state.control().current_step().to_string(), "report_formatter");
}

#[tokio::test]
async fn test_report_write_failure_aborts_run() {
    let dir = workspace();
    std::fs::write(dir.path().join("report"), "not a directory").unwrap();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();

    let err = graph.invoke(state).await.unwrap_err();
    assert!(matches!(err, GraphError::ReportWrite { .. }));
    assert_eq!(err.node(), Some("financial_reporting_a"));
}

#[tokio::test]
async fn test_step_limit_is_enforced() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let graph = workflow(&dir, collaborators, GatePolicy::approve_all())
        .with_step_limit(5)
        .compile("Acme", "Globex")
        .unwrap();

    let err = graph.invoke(state).await.unwrap_err();
    assert!(matches!(err, GraphError::StepLimitExceeded { limit: 5, .. }));
}

#[tokio::test]
async fn test_resume_from_checkpoint_finishes_run() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let saver: Arc<InMemoryCheckpointSaver<DealState>> = Arc::new(InMemoryCheckpointSaver::new());
    let deal = workflow(&dir, collaborators, GatePolicy::approve_all()).with_checkpointer(saver.clone());
    let graph = deal.compile("Acme", "Globex").unwrap();

    let first = graph.invoke_with_report(state).await.unwrap();
    let checkpoints = saver.list(first.run_id).await.unwrap();
    let midway = checkpoints
        .iter()
        .find(|c| c.node == "operations_reporting_a")
        .cloned()
        .unwrap();

    // Steps already recorded for this run id; resume without re-saving them
    let replay = DealWorkflow::new(deal.context().clone(), GatePolicy::approve_all())
        .compile("Acme", "Globex")
        .unwrap();
    let resumed = replay.resume(midway).await.unwrap();
    assert_eq!(resumed.trace.nodes()[0], "generate_queries_b");
    assert_eq!(resumed.state.control().current_step().to_string(), "report_formatter");
}

struct RecordingApprover {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ApprovalProvider for RecordingApprover {
    async fn ask_yes_no(&self, prompt: &str) -> bool {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        // Approve everything except the third question (Acme operations)
        prompts.len() != 3
    }
}

#[tokio::test]
async fn test_interactive_gates_ask_with_company_prompts() {
    let dir = workspace();
    let collaborators = collaborators(Arc::new(ScriptedModel::new(TWO_QUERIES)));
    let state = initial_state(&dir, &collaborators).await;
    let approver = Arc::new(RecordingApprover {
        prompts: Mutex::new(Vec::new()),
    });
    let graph = workflow(&dir, collaborators, GatePolicy::interactive(approver.clone()))
        .compile("Acme", "Globex")
        .unwrap();

    let report = graph.invoke_with_report(state).await.unwrap();

    let prompts = approver.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("web research on Acme"));
    assert!(prompts[1].contains("financial report for Acme"));
    assert!(prompts[2].contains("operations report for Acme"));
    assert_eq!(
        report.termination,
        Termination::GateDeclined {
            node: "ops_human_approval_a".to_string()
        }
    );
}
