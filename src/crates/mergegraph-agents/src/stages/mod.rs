//! Stage handlers of the deal workflow
//!
//! - [`research`] - query generation and the web-search loop body
//! - [`analysis`] - retrieval-backed per-company analyses (DCF, ratios, supply chain, industry)
//! - [`reporting`] - per-company financial and operations reports
//! - [`deal`] - pipeline-level merger, legal and final-report stages
//!
//! Every handler sets `current_step` to its own name on success. A collaborator
//! failure inside a handler degrades the affected artifact to
//! [`NO_INFORMATION`](crate::state::NO_INFORMATION) and records the message in
//! the state's error slot; only report write failures escape as errors.

pub mod analysis;
pub mod deal;
pub mod reporting;
pub mod research;

use crate::artifacts::ArtifactWriter;
use crate::collaborators::{ChatMessage, Collaborators};
use crate::error::CollaboratorError;
use crate::prompts::{keys, PromptBook};
use crate::state::{DealState, NO_INFORMATION};
use mergegraph_core::{StageError, StepStatus, WorkflowState};
use std::fmt;
use tracing::warn;

/// Shared dependencies of every stage in one workflow
#[derive(Debug, Clone)]
pub struct StageContext {
    pub collaborators: Collaborators,
    pub prompts: PromptBook,
    pub writer: ArtifactWriter,
    /// Cap on the search queries kept per company
    pub max_queries: usize,
}

impl StageContext {
    pub fn new(collaborators: Collaborators, prompts: PromptBook, writer: ArtifactWriter) -> Self {
        Self {
            collaborators,
            prompts,
            writer,
            max_queries: 5,
        }
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries.max(1);
        self
    }

    /// Render a template; a missing template is a programming error
    pub(crate) fn render(&self, key: &str, vars: &[(&str, &str)]) -> Result<String, StageError> {
        self.prompts
            .render(key, vars)
            .map_err(|e| StageError::Internal(e.to_string()))
    }

    /// One system + user exchange with the language model
    pub(crate) async fn ask(&self, prompt: String) -> Result<String, CollaboratorError> {
        let mut messages = Vec::with_capacity(2);
        if let Ok(system) = self.prompts.template(keys::SYSTEM) {
            messages.push(ChatMessage::system(system.trim()));
        }
        messages.push(ChatMessage::user(prompt));
        Ok(self.collaborators.llm.invoke(&messages).await?.text)
    }
}

/// Record a collaborator failure and return the placeholder artifact
pub(crate) fn degrade(state: &mut DealState, node: &str, error: impl fmt::Display) -> String {
    warn!(node, error = %error, "Collaborator failed; storing degraded artifact");
    state.control_mut().record_error(node, error);
    NO_INFORMATION.to_string()
}

pub(crate) fn mark_completed(state: &mut DealState, node: &str) {
    state
        .control_mut()
        .set_current_step(StepStatus::completed(node.to_string()));
}

/// `heading` followed by `body`, or just the body when there is no heading
pub(crate) fn with_heading(heading: &str, body: &str) -> String {
    if heading.is_empty() {
        body.trim().to_string()
    } else {
        format!("{}\n{}", heading, body.trim())
    }
}
