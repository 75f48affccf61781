//! Deal state
//!
//! [`DealState`] is the single value threaded through every stage of the deal
//! workflow. It carries the control block the engine routes on, the identity of
//! both companies, per-company artifacts keyed by company name, the
//! pipeline-level findings, and each company's retrieval index handle.

use crate::collaborators::IndexHandle;
use mergegraph_core::{ControlState, WorkflowState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Placeholder stored when a collaborator could not produce an artifact
pub const NO_INFORMATION: &str = "No relevant information found";

/// Which of the two companies a stage is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitySlot {
    A,
    B,
}

impl EntitySlot {
    pub const ALL: [EntitySlot; 2] = [EntitySlot::A, EntitySlot::B];

    /// Suffix appended to stage names bound to this slot
    pub fn suffix(&self) -> &'static str {
        match self {
            EntitySlot::A => "a",
            EntitySlot::B => "b",
        }
    }

    /// `<base>_<suffix>`
    pub fn stage(&self, base: &str) -> String {
        format!("{}_{}", base, self.suffix())
    }
}

impl fmt::Display for EntitySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Identity of one company under evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub name: String,
    pub document: PathBuf,
}

impl EntityProfile {
    pub fn new(name: impl Into<String>, document: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            document: document.into(),
        }
    }
}

/// Kinds of per-company artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    SearchResults,
    DcfModel,
    FinancialRatios,
    FinancialReport,
    SupplyChain,
    IndustryPosition,
    OperationsReport,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::SearchResults,
        ArtifactKind::DcfModel,
        ArtifactKind::FinancialRatios,
        ArtifactKind::FinancialReport,
        ArtifactKind::SupplyChain,
        ArtifactKind::IndustryPosition,
        ArtifactKind::OperationsReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::SearchResults => "search_results",
            ArtifactKind::DcfModel => "dcf_model",
            ArtifactKind::FinancialRatios => "financial_ratios",
            ArtifactKind::FinancialReport => "financial_report",
            ArtifactKind::SupplyChain => "supply_chain",
            ArtifactKind::IndustryPosition => "industry_position",
            ArtifactKind::OperationsReport => "operations_report",
        }
    }
}

/// Everything computed for one company
///
/// Absent analyses are empty strings, never missing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityArtifacts {
    pub search_results: Vec<String>,
    pub dcf_model: String,
    pub financial_ratios: String,
    pub financial_report: String,
    pub supply_chain: String,
    pub industry_position: String,
    pub operations_report: String,
    /// Report files written for this company, by kind
    pub report_files: BTreeMap<ArtifactKind, PathBuf>,
}

impl EntityArtifacts {
    pub fn text(&self, kind: ArtifactKind) -> Option<&str> {
        let text = match kind {
            ArtifactKind::SearchResults => return None,
            ArtifactKind::DcfModel => &self.dcf_model,
            ArtifactKind::FinancialRatios => &self.financial_ratios,
            ArtifactKind::FinancialReport => &self.financial_report,
            ArtifactKind::SupplyChain => &self.supply_chain,
            ArtifactKind::IndustryPosition => &self.industry_position,
            ArtifactKind::OperationsReport => &self.operations_report,
        };
        Some(text.as_str())
    }

    pub fn text_mut(&mut self, kind: ArtifactKind) -> Option<&mut String> {
        match kind {
            ArtifactKind::SearchResults => None,
            ArtifactKind::DcfModel => Some(&mut self.dcf_model),
            ArtifactKind::FinancialRatios => Some(&mut self.financial_ratios),
            ArtifactKind::FinancialReport => Some(&mut self.financial_report),
            ArtifactKind::SupplyChain => Some(&mut self.supply_chain),
            ArtifactKind::IndustryPosition => Some(&mut self.industry_position),
            ArtifactKind::OperationsReport => Some(&mut self.operations_report),
        }
    }

    pub fn is_populated(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::SearchResults => !self.search_results.is_empty(),
            other => self.text(other).map_or(false, |t| !t.trim().is_empty()),
        }
    }
}

/// Merger valuation phase output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergerFindings {
    pub feasibility: String,
    pub valuation: String,
    pub integration_risks: String,
    pub report_file: Option<PathBuf>,
}

/// Legal phase output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegalFindings {
    pub regulatory_compliance: String,
    pub due_diligence: String,
    pub legal_risks: String,
    pub report_file: Option<PathBuf>,
}

/// Final report assembly output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub sections: Vec<String>,
    pub section_templates: String,
    pub summary: String,
    pub consistency_notes: String,
    pub report_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DealState {
    control: ControlState,
    company_a: EntityProfile,
    company_b: EntityProfile,
    artifacts: BTreeMap<String, EntityArtifacts>,
    indexes: BTreeMap<String, IndexHandle>,
    pub merger: MergerFindings,
    pub legal: LegalFindings,
    pub final_report: FinalReport,
}

impl DealState {
    /// Fresh state with every control and artifact field initialized
    pub fn new(company_a: EntityProfile, company_b: EntityProfile) -> Self {
        let names = [company_a.name.clone(), company_b.name.clone()];
        Self {
            control: ControlState::with_keys(names.iter().cloned()),
            artifacts: names.iter().map(|n| (n.clone(), EntityArtifacts::default())).collect(),
            indexes: BTreeMap::new(),
            company_a,
            company_b,
            merger: MergerFindings::default(),
            legal: LegalFindings::default(),
            final_report: FinalReport::default(),
        }
    }

    pub fn entity(&self, slot: EntitySlot) -> &EntityProfile {
        match slot {
            EntitySlot::A => &self.company_a,
            EntitySlot::B => &self.company_b,
        }
    }

    pub fn entity_name(&self, slot: EntitySlot) -> &str {
        &self.entity(slot).name
    }

    pub fn artifacts(&self, slot: EntitySlot) -> &EntityArtifacts {
        self.artifacts_for(self.entity_name(slot)).unwrap_or_else(empty_artifacts)
    }

    /// Artifacts for `slot`, created on first access
    pub fn artifacts_mut(&mut self, slot: EntitySlot) -> &mut EntityArtifacts {
        let name = self.entity(slot).name.clone();
        self.artifacts.entry(name).or_default()
    }

    pub fn artifacts_for(&self, name: &str) -> Option<&EntityArtifacts> {
        self.artifacts.get(name)
    }

    pub fn all_artifacts(&self) -> &BTreeMap<String, EntityArtifacts> {
        &self.artifacts
    }

    /// Populated artifacts as `<company>_<kind>` keys, e.g. `Acme_financial_report`
    pub fn artifact_keys(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .flat_map(|(name, artifacts)| {
                ArtifactKind::ALL
                    .iter()
                    .filter(|kind| artifacts.is_populated(**kind))
                    .map(move |kind| format!("{}_{}", name, kind.as_str()))
            })
            .collect()
    }

    pub fn index(&self, slot: EntitySlot) -> Option<&IndexHandle> {
        self.indexes.get(self.entity_name(slot))
    }

    pub fn set_index(&mut self, slot: EntitySlot, index: IndexHandle) {
        let name = self.entity(slot).name.clone();
        self.indexes.insert(name, index);
    }
}

fn empty_artifacts<'a>() -> &'a EntityArtifacts {
    static EMPTY: std::sync::OnceLock<EntityArtifacts> = std::sync::OnceLock::new();
    EMPTY.get_or_init(EntityArtifacts::default)
}

impl WorkflowState for DealState {
    fn control(&self) -> &ControlState {
        &self.control
    }

    fn control_mut(&mut self) -> &mut ControlState {
        &mut self.control
    }
}
