//! Error types for collaborators and pipeline configuration.

use mergegraph_core::StageError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of an external collaborator (LLM, web search, retrieval, documents).
///
/// Stages either degrade on these (storing a placeholder artifact) or let them
/// surface as [`StageError::Collaborator`], which the runner recovers from.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Web search failed: {0}")]
    Search(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Failed to load document '{}': {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    /// Collaborator family, used as the `collaborator` field of [`StageError`]
    pub fn collaborator(&self) -> &'static str {
        match self {
            CollaboratorError::Search(_) => "web_search",
            CollaboratorError::Retrieval(_) => "retriever",
            CollaboratorError::Document { .. } => "document_loader",
            _ => "llm",
        }
    }
}

impl From<CollaboratorError> for StageError {
    fn from(error: CollaboratorError) -> Self {
        StageError::collaborator(error.collaborator(), error.to_string())
    }
}

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Environment variable {key}: {message}")]
    Env { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown prompt '{0}'")]
    UnknownPrompt(String),
}
