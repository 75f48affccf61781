//! Research phase: query generation and the web-search loop body

use super::{degrade, mark_completed, StageContext};
use crate::prompts::keys;
use crate::state::{DealState, EntitySlot, NO_INFORMATION};
use async_trait::async_trait;
use mergegraph_core::{Stage, StageError, WorkflowState};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

/// `generate_queries_<x>`: asks the model for search queries and queues them
pub struct GenerateQueries {
    name: String,
    slot: EntitySlot,
    ctx: Arc<StageContext>,
}

impl GenerateQueries {
    pub fn new(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self {
            name: slot.stage("generate_queries"),
            slot,
            ctx,
        }
    }
}

#[async_trait]
impl Stage<DealState> for GenerateQueries {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let company = state.entity_name(self.slot).to_string();
        let max = self.ctx.max_queries.to_string();
        let prompt = self.ctx.render(
            keys::QUERY_GENERATION,
            &[("company_name", company.as_str()), ("max_queries", max.as_str())],
        )?;

        match self.ctx.ask(prompt).await {
            Ok(text) => {
                let queries = parse_queries(&text, self.ctx.max_queries);
                info!(node = %self.name, entity = %company, queries = queries.len(), "Search queries generated");
                state.control_mut().enqueue_work(&company, queries);
            }
            Err(e) => {
                degrade(&mut state, &self.name, e);
            }
        }

        mark_completed(&mut state, &self.name);
        Ok(state)
    }
}

/// `web_search_<x>`: one pass of the bounded search loop
///
/// Pops one query from the company's queue, searches, appends the result to the
/// company's search results and folds it into the company's retrieval index.
pub struct SearchPass {
    name: String,
    slot: EntitySlot,
    ctx: Arc<StageContext>,
}

impl SearchPass {
    pub fn new(slot: EntitySlot, ctx: Arc<StageContext>) -> Self {
        Self {
            name: slot.stage("web_search"),
            slot,
            ctx,
        }
    }
}

#[async_trait]
impl Stage<DealState> for SearchPass {
    async fn apply(&self, mut state: DealState) -> Result<DealState, StageError> {
        let company = state.entity_name(self.slot).to_string();

        let Some(query) = state.control_mut().next_work(&company) else {
            debug!(node = %self.name, entity = %company, "No queued query");
            mark_completed(&mut state, &self.name);
            return Ok(state);
        };

        let result = match self.ctx.collaborators.search.search(&query).await {
            Ok(text) => text,
            Err(e) => degrade(&mut state, &self.name, e),
        };

        if result != NO_INFORMATION {
            let retriever = &self.ctx.collaborators.retriever;
            let updated = match state.index(self.slot) {
                Some(index) => retriever.extend(index, &result).await,
                None => retriever.build(&result).await,
            };
            match updated {
                Ok(index) => state.set_index(self.slot, index),
                Err(e) => {
                    degrade(&mut state, &self.name, e);
                }
            }
        }

        debug!(
            node = %self.name,
            entity = %company,
            query = %query,
            remaining = state.control().pending(&company).count(),
            "Search pass finished"
        );
        state.artifacts_mut(self.slot).search_results.push(result);
        mark_completed(&mut state, &self.name);
        Ok(state)
    }
}

static LIST_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:[-*•]+|\d+[.):]|\[\d+\])?\s*["']?"#).expect("Invalid list marker pattern")
});

/// One query per line; list markers and quotes stripped, duplicates dropped
pub fn parse_queries(text: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| LIST_MARKER_REGEX.replace(line, "").into_owned())
        .map(|line| line.trim().trim_end_matches(&['"', '\''][..]).trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{context, deal, with_index, ScriptedModel};
    use mergegraph_core::StepStatus;

    #[test]
    fn test_parse_queries_strips_markers() {
        let text = "Here are the queries:\n1. Acme revenue 2024\n- \"Acme suppliers\"\n* acme revenue 2024\n\n2) Acme market share\n";
        assert_eq!(
            parse_queries(text, 5),
            vec!["Acme revenue 2024", "Acme suppliers", "Acme market share"]
        );
        assert_eq!(parse_queries(text, 1), vec!["Acme revenue 2024"]);
        assert!(parse_queries("", 5).is_empty());
    }

    #[test]
    fn test_list_marker_pattern() {
        for line in ["1. q", "[3] q", "- q", "•• q", "  12) 'q"] {
            assert_eq!(LIST_MARKER_REGEX.replace(line, ""), "q", "{line}");
        }
        assert_eq!(LIST_MARKER_REGEX.replace("2024 outlook", ""), "2024 outlook");
    }

    #[tokio::test]
    async fn test_generate_queries_fills_own_queue() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedModel {
            reply: Some("1. Acme revenue\n2. Acme debt\n3. Acme plants".into()),
            ..Default::default()
        });
        let ctx = context(llm, dir.path());

        let state = GenerateQueries::new(EntitySlot::A, ctx).apply(deal()).await.unwrap();
        assert_eq!(state.control().pending("Acme").collect::<Vec<_>>(), vec!["Acme revenue", "Acme debt", "Acme plants"]);
        assert!(!state.control().has_pending("Globex"));
        assert_eq!(state.control().current_step(), &StepStatus::completed("generate_queries_a"));
    }

    #[tokio::test]
    async fn test_generate_queries_degrades_on_model_failure() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedModel {
            fail_on: Some("search queries".into()),
            ..Default::default()
        });
        let ctx = context(llm, dir.path());

        let state = GenerateQueries::new(EntitySlot::B, ctx).apply(deal()).await.unwrap();
        assert!(!state.control().has_pending("Globex"));
        assert!(state.control().error().unwrap().starts_with("generate_queries_b:"));
        assert_eq!(state.control().current_step().to_string(), "generate_queries_b");
    }

    #[tokio::test]
    async fn test_search_pass_consumes_one_query_and_extends_index() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(ScriptedModel::default()), dir.path());
        let mut state = with_index(&ctx, deal(), EntitySlot::A, "Acme annual report").await;
        state.control_mut().enqueue_work("Acme", ["acme revenue", "acme debt"]);

        let pass = SearchPass::new(EntitySlot::A, ctx);
        let state = pass.apply(state).await.unwrap();

        assert_eq!(state.artifacts(EntitySlot::A).search_results, vec!["result for acme revenue"]);
        assert_eq!(state.control().pending("Acme").collect::<Vec<_>>(), vec!["acme debt"]);
        assert_eq!(state.index(EntitySlot::A).unwrap().documents(), 2);
        assert!(state.artifacts(EntitySlot::B).search_results.is_empty());
    }

    #[tokio::test]
    async fn test_search_pass_with_empty_queue_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(ScriptedModel::default()), dir.path());

        let state = SearchPass::new(EntitySlot::B, ctx).apply(deal()).await.unwrap();
        assert!(state.artifacts(EntitySlot::B).search_results.is_empty());
        assert_eq!(state.control().current_step().to_string(), "web_search_b");
    }
}
