//! Pipeline-level stages
//!
//! These run once, after both companies' sub-pipelines, and read both
//! companies' artifacts. They never branch: each is followed unconditionally by
//! the next.
//!
//! ```text
//! validate_merger_feasibility → calculate_merger_valuation → assess_integration_risks
//!   → finalize_merger_report → assess_regulatory_compliance → conduct_legal_due_diligence
//!   → assess_potential_legal_risks → finalize_legal_report → report_structure_creator
//!   → section_template_generator → rag_summary_generator → consistency_checker
//!   → report_formatter
//! ```

use super::research::parse_queries;
use super::{degrade, mark_completed, StageContext};
use crate::prompts::keys;
use crate::state::{DealState, EntitySlot, NO_INFORMATION};
use async_trait::async_trait;
use mergegraph_core::{Stage, StageError};
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_SECTIONS: &[&str] = &[
    "Executive Summary",
    "Company Profiles",
    "Financial Analysis",
    "Operational Analysis",
    "Merger Valuation",
    "Integration Risks",
    "Legal and Regulatory Review",
    "Recommendation",
];

const MAX_SECTIONS: usize = 12;

type ContextFn = fn(&DealState) -> String;
type StoreFn<T> = fn(&mut DealState, T);

/// Model call whose prompt mentions both companies
pub struct DealAnalysis {
    name: &'static str,
    prompt: &'static str,
    context: ContextFn,
    store: StoreFn<String>,
    ctx: Arc<StageContext>,
}

impl DealAnalysis {
    pub fn new(
        name: &'static str,
        prompt: &'static str,
        context: ContextFn,
        store: StoreFn<String>,
        ctx: Arc<StageContext>,
    ) -> Self {
        Self {
            name,
            prompt,
            context,
            store,
            ctx,
        }
    }

    pub fn validate_merger_feasibility(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "validate_merger_feasibility",
            keys::MERGER_FEASIBILITY,
            |s| both(s, |a| format!("{}\n\n{}", a.financial_report, a.operations_report)),
            |s, text| s.merger.feasibility = text,
            ctx,
        )
    }

    pub fn calculate_merger_valuation(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "calculate_merger_valuation",
            keys::MERGER_VALUATION,
            |s| format!("{}\n\nFeasibility:\n{}", both(s, |a| a.dcf_model.clone()), s.merger.feasibility),
            |s, text| s.merger.valuation = text,
            ctx,
        )
    }

    pub fn assess_integration_risks(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "assess_integration_risks",
            keys::INTEGRATION_RISKS,
            |s| format!("{}\n\nValuation:\n{}", both(s, |a| a.operations_report.clone()), s.merger.valuation),
            |s, text| s.merger.integration_risks = text,
            ctx,
        )
    }

    pub fn assess_regulatory_compliance(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "assess_regulatory_compliance",
            keys::REGULATORY_COMPLIANCE,
            |s| format!("{}\n\nFeasibility:\n{}", both(s, |a| a.industry_position.clone()), s.merger.feasibility),
            |s, text| s.legal.regulatory_compliance = text,
            ctx,
        )
    }

    pub fn conduct_legal_due_diligence(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "conduct_legal_due_diligence",
            keys::LEGAL_DUE_DILIGENCE,
            |s| {
                format!(
                    "{}\n\nRegulatory review:\n{}",
                    both(s, |a| a.search_results.join("\n")),
                    s.legal.regulatory_compliance
                )
            },
            |s, text| s.legal.due_diligence = text,
            ctx,
        )
    }

    pub fn assess_potential_legal_risks(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "assess_potential_legal_risks",
            keys::LEGAL_RISKS,
            |s| {
                format!(
                    "Regulatory review:\n{}\n\nDue diligence:\n{}",
                    s.legal.regulatory_compliance, s.legal.due_diligence
                )
            },
            |s, text| s.legal.legal_risks = text,
            ctx,
        )
    }

    pub fn report_structure_creator(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "report_structure_creator",
            keys::REPORT_STRUCTURE,
            |_| String::new(),
            |s, text| {
                let sections = if text == NO_INFORMATION {
                    Vec::new()
                } else {
                    parse_queries(&text, MAX_SECTIONS)
                };
                s.final_report.sections = if sections.is_empty() {
                    DEFAULT_SECTIONS.iter().map(|t| t.to_string()).collect()
                } else {
                    sections
                };
            },
            ctx,
        )
    }

    pub fn section_template_generator(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "section_template_generator",
            keys::SECTION_TEMPLATES,
            |s| s.final_report.sections.join("\n"),
            |s, text| s.final_report.section_templates = text,
            ctx,
        )
    }

    pub fn consistency_checker(ctx: Arc<StageContext>) -> Self {
        Self::new(
            "consistency_checker",
            keys::CONSISTENCY_CHECK,
            |s| {
                format!(
                    "Sections:\n{}\n\nSummary:\n{}\n\nValuation:\n{}\n\nLegal risks:\n{}",
                    s.final_report.sections.join("\n"),
                    s.final_report.summary,
                    s.merger.valuation,
                    s.legal.legal_risks
                )
            },
            |s, text| s.final_report.consistency_notes = text,
            ctx,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl Stage<DealState> for DealAnalysis {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let context = (self.context)(&state);
        let prompt = {
            let a = state.entity_name(EntitySlot::A);
            let b = state.entity_name(EntitySlot::B);
            self.ctx.render(
                self.prompt,
                &[("company_a_name", a), ("company_b_name", b), ("context", context.trim())],
            )?
        };

        let text = match self.ctx.ask(prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => degrade(&mut state, self.name, e),
        };
        (self.store)(&mut state, text);
        mark_completed(&mut state, self.name);
        Ok(state)
    }
}

/// `rag_summary_generator`: indexes every finding so far and asks for a summary
pub struct RagSummary {
    ctx: Arc<StageContext>,
}

impl RagSummary {
    pub const NAME: &'static str = "rag_summary_generator";

    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage<DealState> for RagSummary {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let corpus = findings_corpus(&state);
        let question = self.ctx.render(
            keys::RAG_SUMMARY,
            &[
                ("company_a_name", state.entity_name(EntitySlot::A)),
                ("company_b_name", state.entity_name(EntitySlot::B)),
            ],
        )?;

        let retriever = &self.ctx.collaborators.retriever;
        let answer = match retriever.build(&corpus).await {
            Ok(index) => retriever.query(&question, &index).await,
            Err(e) => Err(e),
        };
        let summary = match answer {
            Ok(result) => result.result_text.trim().to_string(),
            Err(e) => degrade(&mut state, Self::NAME, e),
        };
        state.final_report.summary = summary;
        mark_completed(&mut state, Self::NAME);
        Ok(state)
    }
}

/// Composes a text document from the state and writes it under the merger report directory
pub struct PublishReport {
    name: &'static str,
    file: &'static str,
    compose: ContextFn,
    store: StoreFn<PathBuf>,
    ctx: Arc<StageContext>,
}

impl PublishReport {
    /// `finalize_merger_report` → `merger_valuation_report.txt`
    pub fn merger_report(ctx: Arc<StageContext>) -> Self {
        Self {
            name: "finalize_merger_report",
            file: "merger_valuation_report",
            compose: compose_merger_report,
            store: |s, path| s.merger.report_file = Some(path),
            ctx,
        }
    }

    /// `finalize_legal_report` → `legal_report.txt`
    pub fn legal_report(ctx: Arc<StageContext>) -> Self {
        Self {
            name: "finalize_legal_report",
            file: "legal_report",
            compose: compose_legal_report,
            store: |s, path| s.legal.report_file = Some(path),
            ctx,
        }
    }

    /// `report_formatter` → `final_report.txt`
    pub fn final_report(ctx: Arc<StageContext>) -> Self {
        Self {
            name: "report_formatter",
            file: "final_report",
            compose: compose_final_report,
            store: |s, path| s.final_report.report_file = Some(path),
            ctx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl Stage<DealState> for PublishReport {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let text = (self.compose)(&state);
        let path = self.ctx.writer.write_pipeline(self.file, &text).await?;
        info!(node = self.name, path = %path.display(), "Pipeline report published");
        (self.store)(&mut state, path);
        mark_completed(&mut state, self.name);
        Ok(state)
    }
}

/// Per-company text for both companies, each under its name
fn both(state: &DealState, part: impl Fn(&crate::state::EntityArtifacts) -> String) -> String {
    EntitySlot::ALL
        .iter()
        .map(|slot| format!("{}:\n{}", state.entity_name(*slot), part(state.artifacts(*slot)).trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn findings_corpus(state: &DealState) -> String {
    let mut out = String::new();
    for slot in EntitySlot::ALL {
        let a = state.artifacts(slot);
        let _ = write!(out, "{}\n{}\n{}\n\n", state.entity_name(slot), a.financial_report, a.operations_report);
    }
    let _ = write!(
        out,
        "{}\n{}\n{}\n{}\n{}\n{}",
        state.merger.feasibility,
        state.merger.valuation,
        state.merger.integration_risks,
        state.legal.regulatory_compliance,
        state.legal.due_diligence,
        state.legal.legal_risks
    );
    out
}

fn title(state: &DealState, kind: &str) -> String {
    format!(
        "{}: {} and {}",
        kind,
        state.entity_name(EntitySlot::A),
        state.entity_name(EntitySlot::B)
    )
}

fn section(out: &mut String, heading: &str, body: &str) {
    let body = body.trim();
    let _ = write!(out, "\n\n## {}\n\n{}", heading, if body.is_empty() { NO_INFORMATION } else { body });
}

fn compose_merger_report(state: &DealState) -> String {
    let mut out = format!("# {}", title(state, "Merger Valuation Report"));
    section(&mut out, "Merger Feasibility", &state.merger.feasibility);
    section(&mut out, "Valuation", &state.merger.valuation);
    section(&mut out, "Integration Risks", &state.merger.integration_risks);
    out.push('\n');
    out
}

fn compose_legal_report(state: &DealState) -> String {
    let mut out = format!("# {}", title(state, "Legal Report"));
    section(&mut out, "Regulatory Compliance", &state.legal.regulatory_compliance);
    section(&mut out, "Legal Due Diligence", &state.legal.due_diligence);
    section(&mut out, "Potential Legal Risks", &state.legal.legal_risks);
    out.push('\n');
    out
}

fn compose_final_report(state: &DealState) -> String {
    let mut out = format!("# {}", title(state, "Merger Analysis Report"));
    let generated = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
    let _ = write!(out, "\n\nGenerated {}", generated);

    let contents: String = state
        .final_report
        .sections
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}\n", i + 1, s))
        .collect();
    section(&mut out, "Contents", &contents);
    section(&mut out, "Executive Summary", &state.final_report.summary);
    for slot in EntitySlot::ALL {
        let a = state.artifacts(slot);
        let name = state.entity_name(slot);
        section(&mut out, &format!("{} Financial Report", name), &a.financial_report);
        section(&mut out, &format!("{} Operations Report", name), &a.operations_report);
    }
    section(&mut out, "Merger Valuation", &state.merger.valuation);
    section(&mut out, "Integration Risks", &state.merger.integration_risks);
    section(&mut out, "Legal Risks", &state.legal.legal_risks);
    section(&mut out, "Section Guidance", &state.final_report.section_templates);
    section(&mut out, "Consistency Review", &state.final_report.consistency_notes);
    out.push('\n');
    out
}
