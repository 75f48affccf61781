//! Shared harness for the deal workflow integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mergegraph_agents::collaborators::{ChatMessage, CollaboratorResult, LlmResponse};
use mergegraph_agents::{
    initialize_state, ArtifactWriter, CollaboratorError, Collaborators, DealState, DealWorkflow, EntityProfile,
    FsDocumentLoader, GatePolicy, KeywordRetriever, LanguageModel, PromptBook, StageContext, WebSearch,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ACME_DOC: &str = "Acme Corp annual report. Revenue grew to 12 billion. \
Acme sources steel from Ohio suppliers and ships anvils worldwide. \
Acme holds 30 percent of the anvil market.";

pub const GLOBEX_DOC: &str = "Globex Corporation annual report. Revenue reached 8 billion. \
Globex relies on rare earth suppliers in Asia. Globex leads the widget segment.";

/// Model that answers query-generation prompts with `queries` and everything
/// else with `answer: <first prompt line>`
pub struct ScriptedModel {
    pub queries: String,
    pub fail_on: Option<String>,
    pub calls: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new(queries: &str) -> Self {
        Self {
            queries: queries.to_string(),
            fail_on: None,
            calls: Mutex::new(0),
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse> {
        *self.calls.lock().unwrap() += 1;
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        if let Some(needle) = &self.fail_on {
            if prompt.contains(needle.as_str()) {
                return Err(CollaboratorError::Provider("scripted outage".into()));
            }
        }
        let text = if prompt.contains("web search queries") {
            self.queries.clone()
        } else {
            format!("answer: {}", prompt.lines().next().unwrap_or_default())
        };
        Ok(LlmResponse {
            text,
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}

pub struct EchoSearch;

#[async_trait]
impl WebSearch for EchoSearch {
    async fn search(&self, query: &str) -> CollaboratorResult<String> {
        Ok(format!("Title: {}\nContent: news about {}", query, query))
    }
}

pub fn collaborators(model: Arc<ScriptedModel>) -> Collaborators {
    let retriever = KeywordRetriever::new(model.clone()).with_chunking(200, 20);
    Collaborators {
        llm: model,
        search: Arc::new(EchoSearch),
        retriever: Arc::new(retriever),
    }
}

/// Temp directory holding both source documents
pub fn workspace() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("acme.txt"), ACME_DOC).expect("write acme");
    std::fs::write(dir.path().join("globex.txt"), GLOBEX_DOC).expect("write globex");
    dir
}

pub async fn initial_state(dir: &TempDir, collaborators: &Collaborators) -> DealState {
    initialize_state(
        EntityProfile::new("Acme", dir.path().join("acme.txt")),
        EntityProfile::new("Globex", dir.path().join("globex.txt")),
        &FsDocumentLoader::new(),
        collaborators.retriever.as_ref(),
    )
    .await
    .expect("initial state")
}

pub fn workflow(dir: &TempDir, collaborators: Collaborators, gates: GatePolicy) -> DealWorkflow {
    let ctx = StageContext::new(
        collaborators,
        PromptBook::embedded().expect("embedded prompts"),
        ArtifactWriter::new("report", "merger_reports").rooted_at(dir.path()),
    );
    DealWorkflow::new(ctx, gates)
}
