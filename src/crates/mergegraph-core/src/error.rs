//! Error types for graph construction and execution
//!
//! Two layers of errors exist in the engine:
//!
//! ```text
//! StageError                 - returned by a single stage handler
//! ├── Collaborator           - retrieval / LLM / search / document failure (recoverable)
//! ├── ReportWrite            - filesystem failure while persisting an artifact (fatal)
//! └── Internal               - handler bug or broken precondition (fatal)
//!
//! GraphError                 - returned by the builder and the runner
//! ├── Validation             - structural problem found at compile time
//! ├── Routing                - router produced a label with no destination
//! ├── StageFailed            - fatal stage failure with node context
//! ├── ReportWrite            - fatal artifact write failure with node context
//! ├── StepLimitExceeded      - global step ceiling reached
//! └── Checkpoint             - checkpoint persistence failure
//! ```
//!
//! The runner recovers from [`StageError::Collaborator`] by recording the message in
//! the state's error slot and continuing along the mapped transition. Every other
//! stage error aborts the run.
//!
//! # Examples
//!
//! ```rust
//! use mergegraph_core::error::{GraphError, StageError};
//!
//! let err = StageError::collaborator("retriever", "index unavailable");
//! assert!(err.is_recoverable());
//!
//! let err = GraphError::Validation("Entry point 'research' does not exist".to_string());
//! assert_eq!(
//!     err.to_string(),
//!     "Graph validation failed: Entry point 'research' does not exist"
//! );
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Failure reported by a single stage handler
///
/// Stage handlers must treat absent optional data as empty defaults; they only
/// return an error when an injected collaborator fails after its own retry policy,
/// when a durable artifact cannot be written, or when an internal invariant breaks.
#[derive(Error, Debug)]
pub enum StageError {
    /// An external collaborator failed after exhausting its retry policy
    ///
    /// **Recovery**: the runner logs it, records it in the state's error slot and
    /// continues to the next mapped transition.
    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        /// Which collaborator failed (e.g. "llm", "retriever", "web_search")
        collaborator: String,
        /// Failure description
        message: String,
    },

    /// Persisting an artifact to the filesystem failed
    ///
    /// **Recovery**: none. The run aborts and the error surfaces to the driver.
    #[error("Failed to write report '{}': {source}", path.display())]
    ReportWrite {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A handler precondition or invariant was violated
    #[error("Internal stage error: {0}")]
    Internal(String),
}

impl StageError {
    /// Build a [`StageError::Collaborator`]
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Build a [`StageError::ReportWrite`]
    pub fn report_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReportWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether the runner may continue past this failure
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StageError::Collaborator { .. })
    }
}

/// Error type for all graph construction and execution operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Raised by `compile()` for duplicate stage names, edges referencing
    /// undeclared stages, a missing entry point, router labels without a mapped
    /// destination, or stages without any outgoing transition.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A router produced a label that has no destination
    ///
    /// Validation makes this unreachable for graphs built through the public API.
    #[error("Router on node '{node}' returned unmapped label '{label}'")]
    Routing {
        /// Node owning the conditional edge
        node: String,
        /// Label returned by the router
        label: String,
    },

    /// A stage failed in a way the runner cannot recover from
    #[error("Node '{node}' execution failed: {error}")]
    StageFailed {
        /// Node that failed
        node: String,
        /// Underlying stage error
        #[source]
        error: StageError,
    },

    /// Persisting an artifact failed; the run was aborted
    #[error("Node '{node}' could not write report '{}': {source}", path.display())]
    ReportWrite {
        /// Node that attempted the write
        node: String,
        /// Destination file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The global step ceiling was reached before a terminal node
    #[error("Maximum steps ({limit}) exceeded before node '{node}'")]
    StepLimitExceeded {
        /// Configured ceiling
        limit: usize,
        /// Node that would have executed next
        node: String,
    },

    /// Saving or loading a checkpoint failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl GraphError {
    /// Attach node context to a fatal stage error
    pub fn from_stage(node: impl Into<String>, error: StageError) -> Self {
        let node = node.into();
        match error {
            StageError::ReportWrite { path, source } => GraphError::ReportWrite { node, path, source },
            other => GraphError::StageFailed { node, error: other },
        }
    }

    /// Name of the node the error originated from, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphError::Routing { node, .. }
            | GraphError::StageFailed { node, .. }
            | GraphError::ReportWrite { node, .. }
            | GraphError::StepLimitExceeded { node, .. } => Some(node),
            _ => None,
        }
    }
}
