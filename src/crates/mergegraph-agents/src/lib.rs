//! Merger-analysis pipeline built on `mergegraph-core`.
//!
//! This crate supplies the domain half of mergegraph: the state that flows
//! through the workflow, the stage handlers, the external collaborators they
//! call, and the assembled two-company deal graph.
//!
//! # Modules
//!
//! - [`state`] - [`DealState`]: per-company artifacts, retrieval indexes and
//!   pipeline-level findings
//! - [`stages`] - research, analysis, reporting and deal-level stage handlers
//! - [`collaborators`] - language model, web search, retrieval and document
//!   loading behind traits, with HTTP and offline implementations
//! - [`workflow`] - [`DealWorkflow`] wiring every stage into one graph
//! - [`config`] - [`PipelineConfig`] loaded from YAML and `MERGEGRAPH_*` env vars
//! - [`prompts`] - the [`PromptBook`] of prompt templates
//! - [`artifacts`] - report files on disk
//!
//! # Example
//!
//! ```rust,no_run
//! use mergegraph_agents::{
//!     initialize_state, Collaborators, DealWorkflow, EntityProfile, FsDocumentLoader,
//!     GatePolicy, PipelineConfig, PromptBook,
//! };
//! use std::error::Error;
//!
//! async fn analyze() -> Result<(), Box<dyn Error>> {
//!     let config = PipelineConfig::load(None)?;
//!     let prompts = PromptBook::embedded()?;
//!     let collaborators = Collaborators::from_config(&config, &prompts)?;
//!     let state = initialize_state(
//!         EntityProfile::new("Acme", "data/acme.txt"),
//!         EntityProfile::new("Globex", "data/globex.txt"),
//!         &FsDocumentLoader::new(),
//!         collaborators.retriever.as_ref(),
//!     )
//!     .await?;
//!
//!     let workflow = DealWorkflow::from_config(&config, collaborators, prompts, GatePolicy::approve_all());
//!     let report = workflow.compile_for(&state)?.invoke_with_report(state).await?;
//!     println!("finished in {} steps", report.steps());
//!     Ok(())
//! }
//! ```

pub mod artifacts;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod prompts;
pub mod stages;
pub mod state;
pub mod workflow;

pub use artifacts::ArtifactWriter;
pub use collaborators::{
    ChatCompletionsModel, Collaborators, DocumentLoader, FsDocumentLoader, IndexHandle, KeywordRetriever,
    LanguageModel, OfflineModel, OfflineSearch, RetrievalResult, Retriever, Retrying, TavilySearch, WebSearch,
};
pub use config::{ApprovalMode, LlmSettings, PipelineConfig, SearchSettings};
pub use error::{CollaboratorError, ConfigError};
pub use prompts::PromptBook;
pub use stages::StageContext;
pub use state::{ArtifactKind, DealState, EntityArtifacts, EntityProfile, EntitySlot, NO_INFORMATION};
pub use workflow::{initialize_state, DealWorkflow, GatePolicy};
