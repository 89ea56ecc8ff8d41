//! The action trait: pure state transitions.

use std::sync::Arc;

/// A pure transformation from an old state to a new state.
///
/// Actions are the only way to change the state held by a
/// [`Store`](crate::Store):
///
/// - they produce a new state out of the old one; state itself is never
///   mutated in place,
/// - they are pure functions: no side effects, no dependencies that are
///   not pure, fully reproducible,
/// - they must be total over the states they can be applied to. The store
///   does not catch panics from an action; a panicking action unwinds out
///   of `dispatch` with the state left as it was.
///
/// Any `Fn(&S) -> S` closure is an action.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn Action<S>>` or
/// `Arc<dyn Action<S>>`.
pub trait Action<S> {
    /// Produce the next state from the current one.
    fn new_state(&self, old_state: &S) -> S;
}

impl<S, F> Action<S> for F
where
    F: Fn(&S) -> S,
{
    fn new_state(&self, old_state: &S) -> S {
        self(old_state)
    }
}

/// A shared, type-erased action as it travels through the dispatch queue
/// and the middleware chain.
///
/// `Arc` rather than `Box` so a chain can hand the action to the next
/// middleware and still report it from [`Chain::action`](crate::Chain::action)
/// afterwards.
pub(crate) type DynAction<S> = Arc<dyn Action<S> + Send + Sync>;
