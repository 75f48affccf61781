//! Routers - pure functions choosing the next stage from the state
//!
//! A router never mutates state. Its result is a label from a closed set,
//! declared as a [`RouteLabel`] enum. When the edge is registered every label
//! must be mapped to a destination, and `compile()` rejects the graph otherwise,
//! so an unhandled branch is a build-time error rather than a runtime surprise.
//!
//! ```rust
//! use mergegraph_core::router::RouteLabel;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Risk { Low, High }
//!
//! impl RouteLabel for Risk {
//!     fn variants() -> &'static [Self] { &[Risk::Low, Risk::High] }
//!     fn as_str(&self) -> &'static str {
//!         match self { Risk::Low => "low", Risk::High => "high" }
//!     }
//! }
//!
//! assert_eq!(Risk::High.as_str(), "high");
//! ```

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Closed, finite set of labels a router can return
pub trait RouteLabel: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every label the router may produce
    fn variants() -> &'static [Self];

    /// Stable textual name used in traces and diagrams
    fn as_str(&self) -> &'static str;
}

/// Conditional edge decision function
pub trait Router<S>: Send + Sync {
    type Label: RouteLabel;

    fn route(&self, state: &S) -> Self::Label;
}

/// Adapter turning a closure into a [`Router`]
pub struct FnRouter<F, L> {
    func: F,
    _label: PhantomData<fn() -> L>,
}

impl<F, L> FnRouter<F, L> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _label: PhantomData,
        }
    }
}

impl<S, F, L> Router<S> for FnRouter<F, L>
where
    F: Fn(&S) -> L + Send + Sync,
    L: RouteLabel,
{
    type Label = L;

    fn route(&self, state: &S) -> L {
        (self.func)(state)
    }
}

/// Outcome of a gate router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateRoute {
    /// The gate was confirmed; proceed to the guarded stage
    Continue,
    /// Anything else; end the run
    Terminate,
}

impl RouteLabel for GateRoute {
    fn variants() -> &'static [Self] {
        &[GateRoute::Continue, GateRoute::Terminate]
    }

    fn as_str(&self) -> &'static str {
        match self {
            GateRoute::Continue => "continue",
            GateRoute::Terminate => "terminate",
        }
    }
}

/// Outcome of a bounded loop router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopRoute {
    /// Run the loop stage again
    Continue,
    /// Fall through to the next phase
    Completed,
}

impl RouteLabel for LoopRoute {
    fn variants() -> &'static [Self] {
        &[LoopRoute::Continue, LoopRoute::Completed]
    }

    fn as_str(&self) -> &'static str {
        match self {
            LoopRoute::Continue => "continue_search",
            LoopRoute::Completed => "fully_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_router_is_pure() {
        let router = FnRouter::new(|n: &i32| if *n > 0 { GateRoute::Continue } else { GateRoute::Terminate });
        let state = 3;
        assert_eq!(router.route(&state), GateRoute::Continue);
        assert_eq!(router.route(&state), GateRoute::Continue);
        assert_eq!(router.route(&-1), GateRoute::Terminate);
    }

    #[test]
    fn test_label_names_are_distinct() {
        let gate: Vec<_> = GateRoute::variants().iter().map(RouteLabel::as_str).collect();
        let looped: Vec<_> = LoopRoute::variants().iter().map(RouteLabel::as_str).collect();
        assert_eq!(gate, vec!["continue", "terminate"]);
        assert_eq!(looped, vec!["continue_search", "fully_completed"]);
    }
}
