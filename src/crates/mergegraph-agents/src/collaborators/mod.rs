//! External collaborators consumed by the stages
//!
//! The engine never calls these; stage handlers do. Every trait is object-safe
//! so the workflow can hold `Arc<dyn Trait>` handles and tests can script them.
//!
//! | Trait | Implementations |
//! |-------|-----------------|
//! | [`LanguageModel`] | [`ChatCompletionsModel`], [`OfflineModel`], [`Retrying`] |
//! | [`WebSearch`] | [`TavilySearch`], [`OfflineSearch`], [`Retrying`] |
//! | [`Retriever`] | [`KeywordRetriever`] |
//! | [`DocumentLoader`] | [`FsDocumentLoader`] |

pub mod documents;
pub mod llm;
pub mod retriever;
pub mod retrying;
pub mod search;

pub use documents::FsDocumentLoader;
pub use llm::{ChatCompletionsModel, OfflineModel};
pub use retriever::KeywordRetriever;
pub use retrying::Retrying;
pub use search::{OfflineSearch, TavilySearch};

use crate::config::PipelineConfig;
use crate::error::CollaboratorError;
use crate::prompts::{keys, PromptBook};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Model output with token accounting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search and return the results as one block of text
    async fn search(&self, query: &str) -> CollaboratorResult<String>;
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> CollaboratorResult<String>;
}

/// One indexed fragment of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: usize,
    pub index: usize,
    pub total: usize,
    pub text: String,
}

/// Opaque handle to a built retrieval index
///
/// Cheap to clone; `extend` produces a new handle and leaves the old one intact,
/// so a restored state snapshot still points at the index it was taken with.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHandle {
    id: Uuid,
    chunks: Arc<Vec<Chunk>>,
    documents: usize,
}

impl IndexHandle {
    pub fn new(chunks: Vec<Chunk>, documents: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunks: Arc::new(chunks),
            documents,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub result_text: String,
    pub source_fragments: Vec<String>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn build(&self, source_text: &str) -> CollaboratorResult<IndexHandle>;

    async fn query(&self, text: &str, index: &IndexHandle) -> CollaboratorResult<RetrievalResult>;

    async fn extend(&self, index: &IndexHandle, new_text: &str) -> CollaboratorResult<IndexHandle>;
}

/// The collaborator set one workflow is assembled with
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LanguageModel>,
    pub search: Arc<dyn WebSearch>,
    pub retriever: Arc<dyn Retriever>,
}

impl Collaborators {
    /// Live or offline collaborators, as `config.offline` selects
    ///
    /// Live model and search clients are wrapped in [`Retrying`] with the
    /// configured fixed delay. The retriever answers with the book's
    /// `rag_answer` template.
    pub fn from_config(config: &PipelineConfig, prompts: &PromptBook) -> CollaboratorResult<Self> {
        let (llm, search): (Arc<dyn LanguageModel>, Arc<dyn WebSearch>) = if config.offline {
            info!("Using offline collaborators");
            (Arc::new(OfflineModel::new()), Arc::new(OfflineSearch))
        } else {
            let policy = config.retry_policy();
            let model = ChatCompletionsModel::from_settings(config.llm.clone())?;
            let search = TavilySearch::from_settings(config.search.clone())?;
            info!(model = %model.model(), "Using live collaborators");
            (
                Arc::new(Retrying::new(model, policy.clone())),
                Arc::new(Retrying::new(search, policy)),
            )
        };

        let mut retriever = KeywordRetriever::from_config(llm.clone(), config);
        if let Ok(template) = prompts.template(keys::RAG_ANSWER) {
            retriever = retriever.with_template(template);
        }
        if let Ok(system) = prompts.template(keys::SYSTEM) {
            retriever = retriever.with_system_prompt(system.trim());
        }

        Ok(Self {
            llm,
            search,
            retriever: Arc::new(retriever),
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
