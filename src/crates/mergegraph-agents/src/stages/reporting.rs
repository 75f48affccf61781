//! Per-company reports
//!
//! Both stages build their text from the company's earlier analyses, store it in
//! the company's artifacts and write `<report_dir>/<company>_<kind>.txt`. A write
//! failure is returned as [`StageError::ReportWrite`] and ends the run.

use super::{degrade, mark_completed, StageContext};
use crate::prompts::keys;
use crate::state::{ArtifactKind, DealState, EntitySlot, NO_INFORMATION};
use async_trait::async_trait;
use mergegraph_core::{Stage, StageError};
use std::sync::Arc;

/// `financial_reporting_<x>`: DCF model and ratios summarized by the model
pub struct FinancialReporting {
    name: String,
    slot: EntitySlot,
    ctx: Arc<StageContext>,
}

impl FinancialReporting {
    pub fn new(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self {
            name: slot.stage("financial_reporting"),
            slot,
            ctx,
        }
    }
}

#[async_trait]
impl Stage<DealState> for FinancialReporting {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let company = state.entity_name(self.slot).to_string();
        let artifacts = state.artifacts(self.slot);
        let context = format!("{}\n\n{}", artifacts.dcf_model, artifacts.financial_ratios);
        let prompt = self.ctx.render(
            keys::FINANCIAL_REPORTING,
            &[("company_name", company.as_str()), ("context", context.trim())],
        )?;

        let body = match self.ctx.ask(prompt).await {
            Ok(text) => text,
            Err(e) => degrade(&mut state, &self.name, e),
        };
        let report = format!("Financial Report: {}\n\n{}", company, body.trim());

        let kind = ArtifactKind::FinancialReport;
        let path = self.ctx.writer.write_entity(&company, kind.as_str(), &report).await?;

        let artifacts = state.artifacts_mut(self.slot);
        artifacts.financial_report = report;
        artifacts.report_files.insert(kind, path);
        mark_completed(&mut state, &self.name);
        Ok(state)
    }
}

/// `operations_reporting_<x>`
///
/// Indexes the supply-chain and industry analyses as a fresh document and asks
/// the operations question against that index only.
pub struct OperationsReporting {
    name: String,
    slot: EntitySlot,
    ctx: Arc<StageContext>,
}

impl OperationsReporting {
    pub fn new(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self {
            name: slot.stage("operations_reporting"),
            slot,
            ctx,
        }
    }
}

#[async_trait]
impl Stage<DealState> for OperationsReporting {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let company = state.entity_name(self.slot).to_string();
        let artifacts = state.artifacts(self.slot);
        let combined = format!("{}\n{}", artifacts.supply_chain, artifacts.industry_position);
        let question = self
            .ctx
            .render(keys::OPERATIONS_REPORTING, &[("company_name", company.as_str())])?;

        let retriever = &self.ctx.collaborators.retriever;
        let answer = match retriever.build(&combined).await {
            Ok(index) => retriever.query(&question, &index).await,
            Err(e) => Err(e),
        };
        let body = match answer {
            Ok(result) => result.result_text,
            Err(e) => degrade(&mut state, &self.name, e),
        };
        let report = if body == NO_INFORMATION {
            body
        } else {
            format!("Operations Report: {}\n\n{}", company, body.trim())
        };

        let kind = ArtifactKind::OperationsReport;
        let path = self.ctx.writer.write_entity(&company, kind.as_str(), &report).await?;

        let artifacts = state.artifacts_mut(self.slot);
        artifacts.operations_report = report;
        artifacts.report_files.insert(kind, path);
        mark_completed(&mut state, &self.name);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{context, deal, ScriptedModel};
    use mergegraph_core::WorkflowState;

    #[tokio::test]
    async fn test_financial_report_is_written_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(ScriptedModel::default()), dir.path());
        let mut state = deal();
        state.artifacts_mut(EntitySlot::A).dcf_model = "DCF Model:\nEV 10bn".into();

        let state = FinancialReporting::new(EntitySlot::A, ctx).apply(state).await.unwrap();

        let acme = state.artifacts(EntitySlot::A);
        assert!(acme.financial_report.starts_with("Financial Report: Acme"));
        let path = dir.path().join("report/Acme_financial_report.txt");
        assert_eq!(acme.report_files.get(&ArtifactKind::FinancialReport), Some(&path));
        assert_eq!(std::fs::read_to_string(path).unwrap(), acme.financial_report);
        assert!(state.artifacts(EntitySlot::B).financial_report.is_empty());
    }

    #[tokio::test]
    async fn test_operations_report_degrades_when_analyses_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(ScriptedModel::default()), dir.path());

        let state = OperationsReporting::new(EntitySlot::B, ctx).apply(deal()).await.unwrap();

        assert_eq!(state.artifacts(EntitySlot::B).operations_report, NO_INFORMATION);
        assert!(state.control().error().unwrap().starts_with("operations_reporting_b:"));
        assert!(dir.path().join("report/Globex_operations_report.txt").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report"), "file in the way").unwrap();
        let ctx = context(Arc::new(ScriptedModel::default()), dir.path());

        let err = FinancialReporting::new(EntitySlot::A, ctx).apply(deal()).await.unwrap_err();
        assert!(matches!(err, StageError::ReportWrite { .. }));
        assert!(!err.is_recoverable());
    }
}
