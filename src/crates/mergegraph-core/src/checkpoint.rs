//! Checkpoints for resumable runs
//!
//! When a [`CheckpointSaver`] is attached to a [`CompiledGraph`](crate::CompiledGraph),
//! the runner saves the state after every step together with the node it will
//! run next. [`CompiledGraph::resume`](crate::CompiledGraph::resume) picks a run
//! back up from any saved checkpoint.
//!
//! ```text
//! run_id ─┬─ [step 1] node=generate_queries_a  next=research_human_approval_a
//!         ├─ [step 2] node=research_human_approval_a  next=web_search_a
//!         └─ [step 3] ...
//! ```

use crate::error::{GraphError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// State snapshot taken after a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<S> {
    /// Run the checkpoint belongs to
    pub run_id: Uuid,
    /// Steps executed so far in the run
    pub step: usize,
    /// Stage that just ran
    pub node: String,
    /// Stage the runner would execute next (END when the run finished)
    pub next_node: String,
    pub state: S,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for checkpoints
#[async_trait]
pub trait CheckpointSaver<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Persist a checkpoint
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<()>;

    /// Most recent checkpoint of a run
    async fn latest(&self, run_id: Uuid) -> Result<Option<Checkpoint<S>>>;

    /// Every checkpoint of a run, oldest first
    async fn list(&self, run_id: Uuid) -> Result<Vec<Checkpoint<S>>>;

    /// Drop every checkpoint of a run recorded after `step`
    ///
    /// Called before a run resumes from an earlier checkpoint, so the resumed
    /// steps extend the history instead of colliding with it.
    async fn truncate_after(&self, run_id: Uuid, step: usize) -> Result<()>;
}

type CheckpointStorage<S> = Arc<RwLock<HashMap<Uuid, Vec<Checkpoint<S>>>>>;

/// Checkpoint saver keeping everything in memory
pub struct InMemoryCheckpointSaver<S> {
    storage: CheckpointStorage<S>,
    max_per_run: Option<usize>,
}

impl<S> InMemoryCheckpointSaver<S> {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            max_per_run: None,
        }
    }

    /// Keep only the newest `limit` checkpoints of each run
    pub fn with_max_per_run(mut self, limit: usize) -> Self {
        self.max_per_run = Some(limit.max(1));
        self
    }

    pub async fn run_count(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.values().map(Vec::len).sum()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl<S> Default for InMemoryCheckpointSaver<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> CheckpointSaver<S> for InMemoryCheckpointSaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn save(&self, checkpoint: Checkpoint<S>) -> Result<()> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(checkpoint.run_id).or_default();

        if let Some(previous) = entries.last() {
            if checkpoint.step <= previous.step {
                return Err(GraphError::Checkpoint(format!(
                    "Checkpoint step {} for run {} is not after step {}",
                    checkpoint.step, checkpoint.run_id, previous.step
                )));
            }
        }

        entries.push(checkpoint);
        if let Some(limit) = self.max_per_run {
            if entries.len() > limit {
                let excess = entries.len() - limit;
                entries.drain(..excess);
            }
        }
        Ok(())
    }

    async fn latest(&self, run_id: Uuid) -> Result<Option<Checkpoint<S>>> {
        Ok(self
            .storage
            .read()
            .await
            .get(&run_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn list(&self, run_id: Uuid) -> Result<Vec<Checkpoint<S>>> {
        Ok(self.storage.read().await.get(&run_id).cloned().unwrap_or_default())
    }

    async fn truncate_after(&self, run_id: Uuid, step: usize) -> Result<()> {
        if let Some(entries) = self.storage.write().await.get_mut(&run_id) {
            entries.retain(|checkpoint| checkpoint.step <= step);
        }
        Ok(())
    }
}
