//! The assembled deal workflow
//!
//! Five segments chained by the engine's [`Sequencer`]:
//!
//! ```text
//! entity_a ──▶ entity_b ──▶ merger ──▶ legal ──▶ report ──▶ END
//! ```
//!
//! Each entity segment is the same topology bound to a different company:
//!
//! ```text
//! generate_queries_x ─▶ research_human_approval_x ─continue─▶ web_search_x ⟲ (bounded)
//!                                   └─terminate─▶ END              │ fully_completed
//!   ┌──────────────────────────────────────────────────────────────┘
//!   ▼
//! DCF_modelling_x ─▶ financial_ratio_x ─▶ fin_human_approval_x ─continue─▶ financial_reporting_x
//!   ─▶ supply_chain_analysis_x ─▶ industry_positioning_x ─▶ ops_human_approval_x
//!   ─continue─▶ operations_reporting_x ─▶ (next segment)
//! ```

use crate::collaborators::{Collaborators, DocumentLoader, Retriever};
use crate::config::{ApprovalMode, PipelineConfig};
use crate::error::{CollaboratorError, ConfigError};
use crate::artifacts::{file_stem, ArtifactWriter};
use crate::prompts::PromptBook;
use crate::stages::analysis::RetrievalAnalysis;
use crate::stages::deal::{DealAnalysis, PublishReport, RagSummary};
use crate::stages::reporting::{FinancialReporting, OperationsReporting};
use crate::stages::research::{GenerateQueries, SearchPass};
use crate::stages::StageContext;
use crate::state::{DealState, EntityProfile, EntitySlot};
use mergegraph_core::{
    ApprovalProvider, ApprovalStrategy, BoundedLoop, CheckpointSaver, CompiledGraph, Gate, Graph,
    GraphError, Result, Segment, Sequencer, StateGraph, DEFAULT_LOOP_CEILING, DEFAULT_STEP_LIMIT, END,
};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Decides how every approval gate of the workflow is answered
#[derive(Debug, Clone)]
pub struct GatePolicy {
    default: ApprovalStrategy,
    overrides: HashMap<String, bool>,
}

impl GatePolicy {
    pub fn new(default: ApprovalStrategy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn approve_all() -> Self {
        Self::new(ApprovalStrategy::Preseeded(true))
    }

    pub fn reject_all() -> Self {
        Self::new(ApprovalStrategy::Preseeded(false))
    }

    pub fn interactive(provider: Arc<dyn ApprovalProvider>) -> Self {
        Self::new(ApprovalStrategy::Interactive(provider))
    }

    /// Policy for a configured mode; interactive mode needs a provider
    pub fn from_mode(
        mode: ApprovalMode,
        provider: Option<Arc<dyn ApprovalProvider>>,
    ) -> std::result::Result<Self, ConfigError> {
        match (mode, provider) {
            (ApprovalMode::AutoApprove, _) => Ok(Self::approve_all()),
            (ApprovalMode::AutoReject, _) => Ok(Self::reject_all()),
            (ApprovalMode::Interactive, Some(provider)) => Ok(Self::interactive(provider)),
            (ApprovalMode::Interactive, None) => Err(ConfigError::Invalid(
                "interactive approval requires an input provider".to_string(),
            )),
        }
    }

    /// Pre-seed one gate, whatever the default strategy
    pub fn with_decision(mut self, gate: impl Into<String>, approved: bool) -> Self {
        self.overrides.insert(gate.into(), approved);
        self
    }

    pub fn gate(&self, name: String, prompt: String) -> Gate {
        let strategy = match self.overrides.get(&name) {
            Some(decision) => ApprovalStrategy::Preseeded(*decision),
            None => self.default.clone(),
        };
        Gate::new(name, strategy).with_prompt(prompt)
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::approve_all()
    }
}

/// Builder for the full deal pipeline
pub struct DealWorkflow {
    ctx: Arc<StageContext>,
    gates: GatePolicy,
    loop_ceiling: u32,
    step_limit: usize,
    checkpointer: Option<Arc<dyn CheckpointSaver<DealState>>>,
}

impl DealWorkflow {
    pub fn new(ctx: impl Into<Arc<StageContext>>, gates: GatePolicy) -> Self {
        Self {
            ctx: ctx.into(),
            gates,
            loop_ceiling: DEFAULT_LOOP_CEILING,
            step_limit: DEFAULT_STEP_LIMIT,
            checkpointer: None,
        }
    }

    /// Workflow with the limits, report directories and query cap from `config`
    pub fn from_config(
        config: &PipelineConfig,
        collaborators: Collaborators,
        prompts: PromptBook,
        gates: GatePolicy,
    ) -> Self {
        let ctx = StageContext::new(collaborators, prompts, ArtifactWriter::from_config(config))
            .with_max_queries(config.max_queries);
        Self::new(ctx, gates)
            .with_loop_ceiling(config.loop_ceiling)
            .with_step_limit(config.step_limit)
    }

    pub fn with_loop_ceiling(mut self, ceiling: u32) -> Self {
        self.loop_ceiling = ceiling;
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver<DealState>>) -> Self {
        self.checkpointer = Some(saver);
        self
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Sub-pipeline for one company
    pub fn entity_segment(&self, slot: EntitySlot, company: &str) -> Segment<DealState> {
        let ctx = &self.ctx;
        let stage = |base: &str| slot.stage(base);

        let research_gate = self.gates.gate(
            stage("research_human_approval"),
            format!("Start web research on {}?", company),
        );
        let fin_gate = self.gates.gate(
            stage("fin_human_approval"),
            format!("Save the financial report for {}?", company),
        );
        let ops_gate = self.gates.gate(
            stage("ops_human_approval"),
            format!("Save the operations report for {}?", company),
        );
        let search_loop = BoundedLoop::new(company, self.loop_ceiling, SearchPass::new(slot, ctx.clone()));

        let mut graph = StateGraph::new();
        graph
            .add_stage(stage("generate_queries"), GenerateQueries::new(slot, ctx.clone()))
            .add_gate(research_gate, stage("web_search"))
            .add_loop(stage("web_search"), search_loop, stage("DCF_modelling"))
            .add_stage(stage("DCF_modelling"), RetrievalAnalysis::dcf_modelling(slot, ctx.clone()))
            .add_stage(stage("financial_ratio"), RetrievalAnalysis::financial_ratio(slot, ctx.clone()))
            .add_gate(fin_gate, stage("financial_reporting"))
            .add_stage(stage("financial_reporting"), FinancialReporting::new(slot, ctx.clone()))
            .add_stage(stage("supply_chain_analysis"), RetrievalAnalysis::supply_chain(slot, ctx.clone()))
            .add_stage(
                stage("industry_positioning"),
                RetrievalAnalysis::industry_positioning(slot, ctx.clone()),
            )
            .add_gate(ops_gate, stage("operations_reporting"))
            .add_stage(stage("operations_reporting"), OperationsReporting::new(slot, ctx.clone()))
            .add_edge(stage("generate_queries"), stage("research_human_approval"))
            .add_edge(stage("DCF_modelling"), stage("financial_ratio"))
            .add_edge(stage("financial_ratio"), stage("fin_human_approval"))
            .add_edge(stage("financial_reporting"), stage("supply_chain_analysis"))
            .add_edge(stage("supply_chain_analysis"), stage("industry_positioning"))
            .add_edge(stage("industry_positioning"), stage("ops_human_approval"))
            .add_edge(stage("operations_reporting"), END)
            .set_entry(stage("generate_queries"));

        Segment::new(format!("entity_{}", slot), graph, stage("operations_reporting"))
    }

    /// Feasibility, valuation and integration risk, then the merger report
    pub fn merger_segment(&self) -> Segment<DealState> {
        let ctx = &self.ctx;
        let mut graph = StateGraph::new();
        graph
            .add_stage("validate_merger_feasibility", DealAnalysis::validate_merger_feasibility(ctx.clone()))
            .add_stage("calculate_merger_valuation", DealAnalysis::calculate_merger_valuation(ctx.clone()))
            .add_stage("assess_integration_risks", DealAnalysis::assess_integration_risks(ctx.clone()))
            .add_stage("finalize_merger_report", PublishReport::merger_report(ctx.clone()))
            .add_edge("validate_merger_feasibility", "calculate_merger_valuation")
            .add_edge("calculate_merger_valuation", "assess_integration_risks")
            .add_edge("assess_integration_risks", "finalize_merger_report")
            .add_edge("finalize_merger_report", END)
            .set_entry("validate_merger_feasibility");
        Segment::new("merger", graph, "finalize_merger_report")
    }

    /// Regulatory compliance, due diligence and legal risk, then the legal report
    pub fn legal_segment(&self) -> Segment<DealState> {
        let ctx = &self.ctx;
        let mut graph = StateGraph::new();
        graph
            .add_stage("assess_regulatory_compliance", DealAnalysis::assess_regulatory_compliance(ctx.clone()))
            .add_stage("conduct_legal_due_diligence", DealAnalysis::conduct_legal_due_diligence(ctx.clone()))
            .add_stage("assess_potential_legal_risks", DealAnalysis::assess_potential_legal_risks(ctx.clone()))
            .add_stage("finalize_legal_report", PublishReport::legal_report(ctx.clone()))
            .add_edge("assess_regulatory_compliance", "conduct_legal_due_diligence")
            .add_edge("conduct_legal_due_diligence", "assess_potential_legal_risks")
            .add_edge("assess_potential_legal_risks", "finalize_legal_report")
            .add_edge("finalize_legal_report", END)
            .set_entry("assess_regulatory_compliance");
        Segment::new("legal", graph, "finalize_legal_report")
    }

    /// Final report assembly
    pub fn report_segment(&self) -> Segment<DealState> {
        let ctx = &self.ctx;
        let mut graph = StateGraph::new();
        graph
            .add_stage("report_structure_creator", DealAnalysis::report_structure_creator(ctx.clone()))
            .add_stage("section_template_generator", DealAnalysis::section_template_generator(ctx.clone()))
            .add_stage(RagSummary::NAME, RagSummary::new(ctx.clone()))
            .add_stage("consistency_checker", DealAnalysis::consistency_checker(ctx.clone()))
            .add_stage("report_formatter", PublishReport::final_report(ctx.clone()))
            .add_edge("report_structure_creator", "section_template_generator")
            .add_edge("section_template_generator", RagSummary::NAME)
            .add_edge(RagSummary::NAME, "consistency_checker")
            .add_edge("consistency_checker", "report_formatter")
            .add_edge("report_formatter", END)
            .set_entry("report_structure_creator");
        Segment::new("report", graph, "report_formatter")
    }

    /// All five segments in execution order
    pub fn sequencer(&self, company_a: &str, company_b: &str) -> Sequencer<DealState> {
        Sequencer::new()
            .then(self.entity_segment(EntitySlot::A, company_a))
            .then(self.entity_segment(EntitySlot::B, company_b))
            .then(self.merger_segment())
            .then(self.legal_segment())
            .then(self.report_segment())
    }

    /// Merged, validated graph for the two companies
    pub fn build(&self, company_a: &str, company_b: &str) -> Result<Graph<DealState>> {
        check_names(company_a, company_b)?;
        self.sequencer(company_a, company_b).build()
    }

    /// Executable workflow for the two companies
    pub fn compile(&self, company_a: &str, company_b: &str) -> Result<CompiledGraph<DealState>> {
        check_names(company_a, company_b)?;
        let compiled = self
            .sequencer(company_a, company_b)
            .compile()?
            .with_step_limit(self.step_limit);
        info!(
            company_a,
            company_b,
            stages = compiled.graph().nodes.len(),
            loop_ceiling = self.loop_ceiling,
            step_limit = self.step_limit,
            "Deal workflow compiled"
        );
        Ok(match &self.checkpointer {
            Some(saver) => compiled.with_checkpointer(saver.clone()),
            None => compiled,
        })
    }

    /// Executable workflow for the companies named in `state`
    pub fn compile_for(&self, state: &DealState) -> Result<CompiledGraph<DealState>> {
        self.compile(state.entity_name(EntitySlot::A), state.entity_name(EntitySlot::B))
    }
}

fn check_names(company_a: &str, company_b: &str) -> Result<()> {
    if company_a.trim().is_empty() || company_b.trim().is_empty() {
        return Err(GraphError::Validation("company names must not be empty".to_string()));
    }
    for name in [company_a, company_b] {
        if file_stem(name) != name.trim() {
            return Err(GraphError::Validation(format!(
                "company name '{}' cannot be used as a report file name",
                name
            )));
        }
    }
    if company_a == company_b {
        return Err(GraphError::Validation(format!(
            "both companies are named '{}'; artifacts are keyed by name",
            company_a
        )));
    }
    Ok(())
}

/// Initial state: loads both source documents and builds each company's index
pub async fn initialize_state(
    company_a: EntityProfile,
    company_b: EntityProfile,
    loader: &dyn DocumentLoader,
    retriever: &dyn Retriever,
) -> std::result::Result<DealState, CollaboratorError> {
    let mut state = DealState::new(company_a, company_b);
    let loads = EntitySlot::ALL
        .iter()
        .map(|slot| loader.load(&state.entity(*slot).document));
    let texts = try_join_all(loads).await?;

    for (slot, text) in EntitySlot::ALL.into_iter().zip(texts) {
        let profile = state.entity(slot).clone();
        let index = retriever.build(&text).await?;
        info!(
            entity = %profile.name,
            document = %profile.document.display(),
            chunks = index.chunks().len(),
            "Company index built"
        );
        state.set_index(slot, index);
    }
    Ok(state)
}
