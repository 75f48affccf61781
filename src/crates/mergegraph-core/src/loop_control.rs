//! Bounded loop controller for self-looping stages
//!
//! Wraps a stage that consumes one unit of pending work per pass (e.g. one search
//! query) and guarantees the loop terminates:
//!
//! 1. Each pass increments `iteration_tracker[key]`, then delegates to the stage.
//! 2. After the pass, the router asks the "more work?" predicate (by default:
//!    the pending queue for `key` is non-empty).
//! 3. The loop completes when the counter reaches the ceiling, or when there is no
//!    more work and at least one pass has run.
//! 4. Otherwise it loops again.
//!
//! The counter lives in the state and is owned by the controller's stage half;
//! the router half only reads it.
//!
//! ```text
//!          ┌──────────────────────────────┐
//!          ▼                              │ Continue
//!   ┌──────────────┐   route(state)   ┌───┴───┐
//!   │ BoundedLoop  │─────────────────▶│ Loop  │──── Completed ───▶ next phase
//!   │ (+1, stage)  │                  │Router │
//!   └──────────────┘                  └───────┘
//! ```

use crate::error::StageError;
use crate::router::{LoopRoute, Router};
use crate::stage::{Stage, StageKind};
use crate::state::WorkflowState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Search loop ceiling of the deal workflow
pub const DEFAULT_LOOP_CEILING: u32 = 26;

type Predicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// Stage wrapper that counts passes and owns the loop ceiling
pub struct BoundedLoop<S: WorkflowState> {
    key: String,
    ceiling: u32,
    stage: Arc<dyn Stage<S>>,
    has_more: Predicate<S>,
}

impl<S: WorkflowState> BoundedLoop<S> {
    /// Wrap `stage`, counting passes under `key`
    ///
    /// A ceiling of zero is raised to one so that at least one pass always runs.
    pub fn new(key: impl Into<String>, ceiling: u32, stage: impl Stage<S> + 'static) -> Self {
        let key = key.into();
        let queue_key = key.clone();
        Self {
            key,
            ceiling: ceiling.max(1),
            stage: Arc::new(stage),
            has_more: Arc::new(move |state: &S| state.control().has_pending(&queue_key)),
        }
    }

    /// Replace the default "pending queue is non-empty" predicate
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.has_more = Arc::new(predicate);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Router deciding between another pass and falling through
    pub fn router(&self) -> LoopRouter<S> {
        LoopRouter {
            key: self.key.clone(),
            ceiling: self.ceiling,
            has_more: self.has_more.clone(),
        }
    }
}

#[async_trait]
impl<S: WorkflowState> Stage<S> for BoundedLoop<S> {
    async fn apply(&self, mut state: S) -> Result<S, StageError> {
        let pass = state.control_mut().advance_iteration(&self.key);
        debug!(key = %self.key, iteration = pass, ceiling = self.ceiling, "Loop pass");

        // Keep the incremented counter even when the pass fails, otherwise a
        // persistently failing stage would never approach the ceiling.
        let counted = state.clone();
        match self.stage.apply(state).await {
            Ok(next) => Ok(next),
            Err(err) if err.is_recoverable() => {
                warn!(key = %self.key, iteration = pass, error = %err, "Loop pass degraded");
                let mut recovered = counted;
                recovered.control_mut().record_error(&self.key, &err);
                Ok(recovered)
            }
            Err(err) => Err(err),
        }
    }

    fn kind(&self) -> StageKind {
        StageKind::Loop
    }
}

/// Router half of a [`BoundedLoop`]
pub struct LoopRouter<S> {
    key: String,
    ceiling: u32,
    has_more: Predicate<S>,
}

impl<S: WorkflowState> Router<S> for LoopRouter<S> {
    type Label = LoopRoute;

    fn route(&self, state: &S) -> LoopRoute {
        let passes = state.control().iteration(&self.key);

        if passes >= self.ceiling {
            info!(key = %self.key, iteration = passes, "Loop reached iteration ceiling");
            return LoopRoute::Completed;
        }

        if passes > 0 && !(self.has_more)(state) {
            info!(key = %self.key, iteration = passes, "Loop drained pending work");
            return LoopRoute::Completed;
        }

        LoopRoute::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{FnStage, StageFuture};
    use crate::state::ControlState;
    use proptest::prelude::*;

    fn consume(key: &'static str) -> FnStage<impl Fn(ControlState) -> StageFuture<ControlState>> {
        FnStage::new(move |mut state: ControlState| -> StageFuture<ControlState> {
            Box::pin(async move {
                state.next_work(key);
                Ok(state)
            })
        })
    }

    async fn drive(looped: &BoundedLoop<ControlState>, mut state: ControlState) -> (ControlState, u32) {
        let router = looped.router();
        let mut passes = 0;
        loop {
            state = looped.apply(state).await.unwrap();
            passes += 1;
            if router.route(&state) == LoopRoute::Completed {
                return (state, passes);
            }
            assert!(passes < 10_000, "loop failed to terminate");
        }
    }

    #[tokio::test]
    async fn test_drains_queue_before_ceiling() {
        let looped = BoundedLoop::new("a", DEFAULT_LOOP_CEILING, consume("a"));
        let mut state = ControlState::with_keys(["a"]);
        state.enqueue_work("a", ["q1", "q2"]);

        let (state, passes) = drive(&looped, state).await;
        assert_eq!(passes, 2);
        assert_eq!(state.iteration("a"), 2);
    }

    #[tokio::test]
    async fn test_never_empty_queue_stops_at_ceiling() {
        let looped = BoundedLoop::new("a", 26, consume("a")).with_predicate(|_| true);
        let (state, passes) = drive(&looped, ControlState::with_keys(["a"])).await;
        assert_eq!(passes, 26);
        assert_eq!(state.iteration("a"), 26);
    }

    #[tokio::test]
    async fn test_empty_queue_still_runs_once() {
        let looped = BoundedLoop::new("a", 5, consume("a"));
        let (_, passes) = drive(&looped, ControlState::with_keys(["a"])).await;
        assert_eq!(passes, 1);
    }

    #[tokio::test]
    async fn test_router_does_not_mutate() {
        let looped = BoundedLoop::new("a", 3, consume("a"));
        let mut state = ControlState::with_keys(["a"]);
        state.enqueue_work("a", ["q"]);
        let before = state.clone();
        let _ = looped.router().route(&state);
        assert_eq!(state, before);
        assert_eq!(looped.router().route(&state), LoopRoute::Continue);
    }

    #[tokio::test]
    async fn test_failing_pass_is_still_counted() {
        let failing = FnStage::new(|_state: ControlState| -> StageFuture<ControlState> {
            Box::pin(async move { Err(StageError::collaborator("web_search", "offline")) })
        });
        let looped = BoundedLoop::new("b", 4, failing);
        let mut state = ControlState::with_keys(["b"]);
        state.enqueue_work("b", ["q1"]);

        let (state, passes) = drive(&looped, state).await;
        assert_eq!(passes, 4);
        assert!(state.error().unwrap().contains("offline"));
        // The item was never consumed
        assert!(state.has_pending("b"));
    }

    #[tokio::test]
    async fn test_fatal_pass_error_propagates() {
        let failing = FnStage::new(|_state: ControlState| -> StageFuture<ControlState> {
            Box::pin(async move { Err(StageError::Internal("broken".into())) })
        });
        let looped = BoundedLoop::new("b", 4, failing);
        assert!(looped.apply(ControlState::default()).await.is_err());
    }

    #[test]
    fn test_zero_ceiling_is_raised() {
        let looped = BoundedLoop::<ControlState>::new("a", 0, consume("a"));
        assert_eq!(looped.ceiling(), 1);
    }

    proptest! {
        #[test]
        fn prop_passes_are_min_of_queue_and_ceiling(queue in 0usize..40, ceiling in 1u32..30) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let looped = BoundedLoop::new("a", ceiling, consume("a"));
            let mut state = ControlState::with_keys(["a"]);
            state.enqueue_work("a", (0..queue).map(|i| format!("q{i}")));

            let (_, passes) = runtime.block_on(drive(&looped, state));
            let expected = (queue.max(1) as u32).min(ceiling);
            prop_assert_eq!(passes, expected);
        }
    }
}
