//! Retrieval-backed per-company analyses

use super::{degrade, mark_completed, with_heading, StageContext};
use crate::prompts::keys;
use crate::state::{ArtifactKind, DealState, EntitySlot, NO_INFORMATION};
use async_trait::async_trait;
use mergegraph_core::{Stage, StageError};
use std::sync::Arc;
use tracing::{info, warn};

/// One question asked against a company's retrieval index
///
/// The answer is stored under a single [`ArtifactKind`] of the bound company.
pub struct RetrievalAnalysis {
    name: String,
    slot: EntitySlot,
    prompt: &'static str,
    artifact: ArtifactKind,
    heading: &'static str,
    ctx: Arc<StageContext>,
}

impl RetrievalAnalysis {
    pub fn new(
        base: &str,
        slot: EntitySlot,
        prompt: &'static str,
        artifact: ArtifactKind,
        ctx: Arc<StageContext>,
    ) -> Self {
        Self {
            name: slot.stage(base),
            slot,
            prompt,
            artifact,
            heading: "",
            ctx,
        }
    }

    /// `DCF_modelling_<x>`
    pub fn dcf_modelling(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self::new("DCF_modelling", slot, keys::DCF_MODEL, ArtifactKind::DcfModel, ctx)
            .with_heading("DCF Model:")
    }

    /// `financial_ratio_<x>`
    pub fn financial_ratio(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self::new("financial_ratio", slot, keys::FINANCIAL_RATIOS, ArtifactKind::FinancialRatios, ctx)
            .with_heading("Financial Ratios:")
    }

    /// `supply_chain_analysis_<x>`
    pub fn supply_chain(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self::new("supply_chain_analysis", slot, keys::SUPPLY_CHAIN, ArtifactKind::SupplyChain, ctx)
            .with_heading("Supply Chain Analysis:")
    }

    /// `industry_positioning_<x>`
    pub fn industry_positioning(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self::new(
            "industry_positioning",
            slot,
            keys::INDUSTRY_POSITIONING,
            ArtifactKind::IndustryPosition,
            ctx,
        )
        .with_heading("Industry Positioning Analysis:")
    }

    pub fn with_heading(mut self, heading: &'static str) -> Self {
        self.heading = heading;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Stage<DealState> for RetrievalAnalysis {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let company = state.entity_name(self.slot).to_string();
        let question = self.ctx.render(self.prompt, &[("company_name", company.as_str())])?;

        let body = match state.index(self.slot).cloned() {
            Some(index) => match self.ctx.collaborators.retriever.query(&question, &index).await {
                Ok(result) => {
                    info!(
                        node = %self.name,
                        entity = %company,
                        fragments = result.source_fragments.len(),
                        "Analysis complete"
                    );
                    result.result_text
                }
                Err(e) => degrade(&mut state, &self.name, e),
            },
            None => {
                warn!(node = %self.name, entity = %company, "No retrieval index for company");
                NO_INFORMATION.to_string()
            }
        };

        let text = if body == NO_INFORMATION {
            body
        } else {
            with_heading(self.heading, &body)
        };
        if let Some(slot) = state.artifacts_mut(self.slot).text_mut(self.artifact) {
            *slot = text;
        }
        mark_completed(&mut state, &self.name);
        Ok(state)
    }
}
